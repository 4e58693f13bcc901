//! Virtual time policy.
//!
//! Every time that is used as a scheduling key goes through [`quantize`] so that instants which are
//! logically the same compare equal, and "did these two frames start together" is always answered
//! by [`same_instant`]. Nothing else in the crate rounds times on its own.

use crate::units::Time;

/// Length of one backoff slot.
pub const SLOT_TIME: Time = Time::from_micros(9.0);

/// Two notifications whose timestamps are closer than this started at the same instant.
pub const MAX_DIFFERENCE_SAME_TIME: Time = Time::from_seconds(1e-9);

/// Margin added to (or removed from) timeouts so they never race the frame they guard.
pub const TIME_OUT_EXTRA_TIME: Time = Time::from_micros(1.0);

/// Granularity of the random preoccupancy delay, see [`preoccupancy_delay`].
pub const MAX_NUM_RAND_TIME: u32 = 100;

const TRUNCATE_DIGITS: i32 = 13;
const ROUND_DIGITS: i32 = 12;

/// Truncates `time` to 13 fractional digits and then rounds it to 12.
pub fn quantize(time: Time) -> Time {
    Time::from_seconds(round_to_digits(
        truncate_to_digits(time.seconds(), TRUNCATE_DIGITS),
        ROUND_DIGITS,
    ))
}

/// True if the two instants differ by less than [`MAX_DIFFERENCE_SAME_TIME`].
/// Symmetric in its arguments.
pub fn same_instant(a: Time, b: Time) -> bool {
    (a - b).seconds().abs() < MAX_DIFFERENCE_SAME_TIME.seconds()
}

/// Delay between winning contention and occupying the channel.
/// `draw` must lie in `2..MAX_NUM_RAND_TIME`, so the delay is always below [`MAX_DIFFERENCE_SAME_TIME`].
pub fn preoccupancy_delay(draw: u32) -> Time {
    debug_assert!((2..MAX_NUM_RAND_TIME).contains(&draw));
    quantize(MAX_DIFFERENCE_SAME_TIME * (draw as f64 / MAX_NUM_RAND_TIME as f64))
}

fn truncate_to_digits(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).trunc() / scale
}

fn round_to_digits(value: f64, digits: i32) -> f64 {
    if value == 0.0 {
        return 0.0;
    }

    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_collapses_drift() {
        let a = Time::from_seconds(0.1) + Time::from_seconds(0.2);
        let b = Time::from_seconds(0.3);
        assert_ne!(a, b);
        assert_eq!(quantize(a), quantize(b));
    }

    #[test]
    fn quantize_is_idempotent() {
        let t = quantize(Time::from_seconds(1.234_567_890_123_456));
        assert_eq!(quantize(t), t);
        assert_eq!(quantize(Time::ZERO), Time::ZERO);
    }

    #[test]
    fn quantize_keeps_picoseconds() {
        let t = quantize(Time::from_seconds(0.000_034_000_000_7));
        assert_eq!(t, Time::from_seconds(0.000_034_000_001));
    }

    #[test]
    fn same_instant_window() {
        let t = Time::from_seconds(0.5);
        assert!(same_instant(t, t));
        assert!(same_instant(t, t + Time::from_seconds(0.9e-9)));
        assert!(same_instant(t + Time::from_seconds(0.9e-9), t));
        assert!(!same_instant(t, t + Time::from_seconds(2e-9)));
        assert!(!same_instant(t + SLOT_TIME, t));
    }

    #[test]
    fn preoccupancy_stays_inside_window() {
        for draw in 2..MAX_NUM_RAND_TIME {
            let delay = preoccupancy_delay(draw);
            assert!(delay > Time::ZERO);
            assert!(delay < MAX_DIFFERENCE_SAME_TIME);
        }
    }
}
