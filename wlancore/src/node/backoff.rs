use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

use crate::{timing::SLOT_TIME, units::Time};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BackoffType {
    /// Countdown in whole slots.
    #[default]
    Slotted,
    Continuous,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BackoffDistribution {
    /// Uniform over `[0, cw - 1]` slots.
    #[default]
    Uniform,
    /// Exponential with a mean of `(cw - 1) / 2` slots.
    Exponential,
    /// Always `(cw - 1) / 2` slots.
    Deterministic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CwAdaptation {
    Constant,
    /// Doubles on every loss up to the maximum stage, back to the minimum on success.
    #[default]
    BinaryExponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentionWindow {
    min: u32,
    max_stage: u32,
    current: u32,
    stage: u32,
}

impl ContentionWindow {
    pub fn new(min: u32, max_stage: u32) -> Self {
        Self {
            min,
            max_stage,
            current: min,
            stage: 0,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.min << self.max_stage
    }

    pub fn increase(&mut self, adaptation: CwAdaptation) {
        if adaptation == CwAdaptation::BinaryExponential && self.stage < self.max_stage {
            self.stage += 1;
            self.current = self.min << self.stage;
        }
    }

    pub fn reset(&mut self, adaptation: CwAdaptation) {
        if adaptation == CwAdaptation::BinaryExponential {
            self.stage = 0;
            self.current = self.min;
        }
    }
}

/// Draws a new backoff for a contention window of `cw` slots.
pub fn draw_backoff<R: Rng + ?Sized>(
    distribution: BackoffDistribution,
    backoff_type: BackoffType,
    cw: u32,
    rng: &mut R,
) -> Time {
    let top = cw.saturating_sub(1);

    let slots = match (distribution, backoff_type) {
        (BackoffDistribution::Deterministic, _) => (top / 2) as f64,
        (BackoffDistribution::Uniform, BackoffType::Slotted) => rng.random_range(0..=top) as f64,
        (BackoffDistribution::Uniform, BackoffType::Continuous) => {
            rng.random::<f64>() * top as f64
        }
        (BackoffDistribution::Exponential, _) => {
            let mean = top as f64 / 2.0;
            let sample = match Exp::new(1.0 / mean) {
                Ok(exp) if mean > 0.0 => exp.sample(rng),
                _ => 0.0,
            };

            match backoff_type {
                BackoffType::Slotted => sample.round(),
                BackoffType::Continuous => sample,
            }
        }
    };

    SLOT_TIME * slots
}

/// Backoff left when the countdown is frozen `left` before it would have expired.
/// Slotted backoff only freezes at slot boundaries, so the remainder rounds up to a whole slot.
pub fn remaining_backoff(backoff_type: BackoffType, left: Time) -> Time {
    let left = left.max(Time::ZERO);

    match backoff_type {
        BackoffType::Continuous => left,
        BackoffType::Slotted => {
            let slots = left / SLOT_TIME;
            let nearest = slots.round();
            let whole = if (slots - nearest).abs() < 1e-6 {
                nearest
            } else {
                slots.ceil()
            };
            SLOT_TIME * whole
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    use crate::assert_close;

    use super::*;

    #[test]
    fn cw_bounds_under_adaptation() {
        let mut cw = ContentionWindow::new(16, 3);

        for _ in 0..10 {
            cw.increase(CwAdaptation::BinaryExponential);
            assert!(cw.current() <= 16 << 3);
            assert!(cw.current() >= 16);
        }
        assert_eq!(cw.current(), cw.max());

        cw.reset(CwAdaptation::BinaryExponential);
        assert_eq!(cw.current(), 16);
        assert_eq!(cw.stage(), 0);

        cw.increase(CwAdaptation::Constant);
        assert_eq!(cw.current(), 16);
    }

    #[test]
    fn draws_are_non_negative_and_bounded() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);

        for distribution in [
            BackoffDistribution::Uniform,
            BackoffDistribution::Exponential,
            BackoffDistribution::Deterministic,
        ] {
            for backoff_type in [BackoffType::Slotted, BackoffType::Continuous] {
                for _ in 0..200 {
                    let bo = draw_backoff(distribution, backoff_type, 32, &mut rng);
                    assert!(bo >= Time::ZERO);

                    if distribution != BackoffDistribution::Exponential {
                        assert!(bo <= SLOT_TIME * 31.0);
                    }
                    if backoff_type == BackoffType::Slotted {
                        let slots = bo / SLOT_TIME;
                        assert!((slots - slots.round()).abs() < 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn deterministic_is_half_window() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let bo = draw_backoff(BackoffDistribution::Deterministic, BackoffType::Slotted, 16, &mut rng);
        assert_close(bo, SLOT_TIME * 7.0);

        let single = draw_backoff(BackoffDistribution::Exponential, BackoffType::Slotted, 1, &mut rng);
        assert_eq!(single, Time::ZERO);
    }

    #[test]
    fn pause_without_elapsed_time_is_exact() {
        for slots in [0.0, 1.0, 7.0, 31.0, 1023.0] {
            let bo = SLOT_TIME * slots;
            assert_eq!(remaining_backoff(BackoffType::Slotted, bo), bo);
            assert_eq!(remaining_backoff(BackoffType::Continuous, bo), bo);
        }
    }

    #[test]
    fn slotted_remainder_rounds_up() {
        let left = SLOT_TIME * 3.4;
        assert_close(remaining_backoff(BackoffType::Slotted, left), SLOT_TIME * 4.0);
        assert_close(remaining_backoff(BackoffType::Continuous, left), left);
        assert_eq!(
            remaining_backoff(BackoffType::Slotted, Time::from_micros(-1.0)),
            Time::ZERO
        );
    }
}
