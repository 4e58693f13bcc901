//! Decides whether a frame survives at a receiver and, if not, why.
//!
//! [`classify`] only looks at physical quantities. Everything that depends on what the receiver was
//! doing at the time (already receiving, deferring, frames starting together) is layered on top by
//! the node with the helpers below.

use crate::{
    channel::{Channel, ChannelRange},
    notification::LossReason,
    timing::same_instant,
    units::{Db, Dbf, Power, Time},
};

/// What a receiver knows about the frame it is interested in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reception {
    pub primary: Channel,
    /// Channels of the frame of interest.
    pub range: ChannelRange,
    /// Power received from the transmitter of interest, per channel.
    pub power: Power,
    /// Linear SINR of the frame of interest.
    pub sinr: f64,
    pub sensitivity: Db<Power>,
    pub capture_effect: Dbf,
}

/// Returns exactly one reason, checked in this order: range, signal strength, SINR.
pub fn classify(reception: &Reception) -> LossReason {
    if !reception.range.contains(reception.primary) {
        LossReason::LostOutsideChRange
    } else if Db::from(reception.power) < reception.sensitivity {
        LossReason::LostLowSignal
    } else if Dbf::from_unit(reception.sinr) < reception.capture_effect {
        LossReason::LostInterference
    } else {
        LossReason::NotLost
    }
}

/// Interference between two frames that started at the same instant is a backoff collision.
pub fn promote_if_simultaneous(reason: LossReason, a: Time, b: Time) -> LossReason {
    if reason == LossReason::LostInterference && same_instant(a, b) {
        LossReason::LostBoCollision
    } else {
        reason
    }
}

/// Reason to report when a second frame for the same receiver destroyed the ongoing reception.
/// `None` if the ongoing frame survives.
pub fn as_pure_collision(reason: LossReason, ongoing: Time, incoming: Time) -> Option<LossReason> {
    match reason {
        LossReason::NotLost | LossReason::LostOutsideChRange => None,
        _ if same_instant(ongoing, incoming) => Some(LossReason::LostBoCollision),
        _ => Some(LossReason::LostPureCollision),
    }
}

/// Constant packet error rate: `draw` is uniform in `[0, 1)`.
pub fn per_hit(per: f64, draw: f64) -> bool {
    draw < per
}
