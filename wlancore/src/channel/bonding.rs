use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Channel, ChannelRange};
use crate::mcs::{McsPerWidth, NUM_WIDTHS};

/// How a node picks the channels of a transmission once its backoff expired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ChannelBondingPolicy {
    /// Only ever use the primary channel.
    #[default]
    OnlyPrimary,
    /// Use the whole allowed range or do not transmit.
    Static,
    /// Widest valid range.
    AlwaysMax,
    /// Valid range with the highest data rate for the destination.
    OptimalMcs,
    /// Uniformly random among the valid ranges.
    ProbabilisticUniform,
}

/// Ranges a transmission could use: aligned power of two widths containing the primary,
/// inside the allowed range, completely free and decodable by the destination.
/// Ordered from narrowest to widest.
pub fn candidate_ranges(
    free: &[bool],
    allowed: ChannelRange,
    primary: Channel,
    mcs: &McsPerWidth,
) -> Vec<ChannelRange> {
    (0..NUM_WIDTHS)
        .filter_map(|width_index| {
            let width = 1usize << width_index;
            let left = (primary.0 / width) * width;
            let range = ChannelRange::new(left, left + width - 1);

            let valid = range.right.0 < free.len()
                && allowed.contains_range(range)
                && range.channels().all(|c| free[c.0])
                && mcs[width_index].is_some();

            valid.then_some(range)
        })
        .collect()
}

impl ChannelBondingPolicy {
    /// Picks the channels for the next transmission, `None` if the policy allows nothing right now.
    pub fn select<R: Rng + ?Sized>(
        self,
        free: &[bool],
        allowed: ChannelRange,
        primary: Channel,
        mcs: &McsPerWidth,
        rng: &mut R,
    ) -> Option<ChannelRange> {
        let candidates = candidate_ranges(free, allowed, primary, mcs);

        match self {
            ChannelBondingPolicy::OnlyPrimary => candidates.first().copied().filter(|x| x.width() == 1),
            ChannelBondingPolicy::Static => candidates.into_iter().find(|x| *x == allowed),
            ChannelBondingPolicy::AlwaysMax => candidates.last().copied(),
            ChannelBondingPolicy::OptimalMcs => candidates.into_iter().max_by(|a, b| {
                let rate = |range: &ChannelRange| {
                    mcs[range.width_index()]
                        .map(|m| m.data_rate(range.width_index()).bits_per_second())
                        .unwrap_or(0.0)
                };
                rate(a).total_cmp(&rate(b))
            }),
            ChannelBondingPolicy::ProbabilisticUniform => {
                if candidates.is_empty() {
                    None
                } else {
                    Some(candidates[rng.random_range(0..candidates.len())])
                }
            }
        }
    }
}
