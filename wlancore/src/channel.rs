//! What a single node can sense of the shared medium.
//!
//! Each node keeps its own [`ChannelView`]: the power every currently transmitting node contributes
//! to each sub-channel at this node's position, the aggregate per channel, and when each channel
//! last became free. There is no global channel object. Views stay consistent because every node
//! applies the same start and finish notifications.

pub mod bonding;
pub mod models;

use std::{collections::BTreeMap, fmt::Display, ops::RangeInclusive};

use models::{AdjacentChannelModel, PathlossModel};
use serde::{Deserialize, Serialize};

use crate::{
    position::Position,
    units::{Db, Dbf, Frequency, Power, Time},
};

/// Index of a basic sub-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Channel(pub usize);

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Contiguous, inclusive range of sub-channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRange {
    pub left: Channel,
    pub right: Channel,
}

impl ChannelRange {
    pub fn new(left: usize, right: usize) -> Self {
        debug_assert!(left <= right);
        Self {
            left: Channel(left),
            right: Channel(right),
        }
    }

    pub fn single(channel: Channel) -> Self {
        Self {
            left: channel,
            right: channel,
        }
    }

    pub fn width(self) -> usize {
        self.right.0 - self.left.0 + 1
    }

    /// Position of this width in the per-width tables (1, 2, 4, 8 channels → 0, 1, 2, 3).
    /// Only meaningful for power of two widths.
    pub fn width_index(self) -> usize {
        self.width().ilog2() as usize
    }

    pub fn contains(self, channel: Channel) -> bool {
        self.left <= channel && channel <= self.right
    }

    pub fn contains_range(self, other: ChannelRange) -> bool {
        self.contains(other.left) && self.contains(other.right)
    }

    /// Number of channels between `channel` and the closest edge of the range, 0 if inside.
    pub fn separation(self, channel: Channel) -> usize {
        if channel < self.left {
            self.left.0 - channel.0
        } else if channel > self.right {
            channel.0 - self.right.0
        } else {
            0
        }
    }

    pub fn channels(self) -> impl Iterator<Item = Channel> {
        self.indices().map(Channel)
    }

    fn indices(self) -> RangeInclusive<usize> {
        self.left.0..=self.right.0
    }
}

impl Display for ChannelRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.left, self.right)
    }
}

/// Physical parameters shared by every link in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropagationModel {
    pub path_loss: PathlossModel,
    pub adjacent_channel: AdjacentChannelModel,
    pub central_frequency: Frequency,
}

impl Default for PropagationModel {
    fn default() -> Self {
        Self {
            path_loss: PathlossModel::default(),
            adjacent_channel: AdjacentChannelModel::None,
            central_frequency: Frequency::from_GHz(5.0),
        }
    }
}

impl PropagationModel {
    /// Power received per channel at `receiver` from a sender emitting `power_per_channel`.
    pub fn received_power(
        &self,
        power_per_channel: Db<Power>,
        gains: Dbf,
        sender: Position,
        receiver: Position,
    ) -> Power {
        let distance = sender.distance_to(receiver);
        self.path_loss
            .power_at_receiver(power_per_channel + gains, self.central_frequency, distance)
            .as_linear()
    }

    /// Spreads the in-range received power over all `num_channels`, applying adjacent channel leakage.
    pub fn spread(&self, in_range: Power, range: ChannelRange, num_channels: usize) -> Vec<Power> {
        (0..num_channels)
            .map(|c| {
                match self.adjacent_channel.leakage(range.separation(Channel(c))) {
                    Some(attenuation) => (Db::from(in_range) - attenuation).as_linear(),
                    None => Power::ZERO,
                }
            })
            .collect()
    }
}

/// Sub-channel power as sensed by one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelView {
    power: Vec<Power>,
    contributions: BTreeMap<usize, Vec<Power>>,

    /// Time each channel last dropped below the sensitivity threshold, `None` while busy.
    free_since: Vec<Option<Time>>,
}

impl ChannelView {
    pub fn new(num_channels: usize) -> Self {
        Self {
            power: vec![Power::ZERO; num_channels],
            contributions: BTreeMap::new(),
            free_since: vec![Some(Time::ZERO); num_channels],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.power.len()
    }

    /// Registers the contribution of a transmitter that just started.
    /// A second start from the same source replaces its previous contribution.
    pub fn add_transmitter(&mut self, source: usize, contribution: Vec<Power>) {
        debug_assert_eq!(contribution.len(), self.power.len());
        self.contributions.insert(source, contribution);
        self.accumulate();
    }

    /// Removes the contribution of a transmitter that just finished.
    pub fn remove_transmitter(&mut self, source: usize) {
        if self.contributions.remove(&source).is_some() {
            self.accumulate();
        }
    }

    // Summing in transmitter id order makes a start/finish pair an exact round trip.
    fn accumulate(&mut self) {
        self.power.iter_mut().for_each(|x| *x = Power::ZERO);
        for contribution in self.contributions.values() {
            for (total, part) in self.power.iter_mut().zip(contribution) {
                *total = *total + *part;
            }
        }
    }

    pub fn power(&self, channel: Channel) -> Power {
        self.power[channel.0]
    }

    pub fn powers(&self) -> &[Power] {
        &self.power
    }

    pub fn contribution(&self, source: usize, channel: Channel) -> Power {
        self.contributions
            .get(&source)
            .map(|x| x[channel.0])
            .unwrap_or(Power::ZERO)
    }

    pub fn is_transmitting(&self, source: usize) -> bool {
        self.contributions.contains_key(&source)
    }

    /// Largest power inside `range` that does not come from `source`.
    pub fn max_interference(&self, range: ChannelRange, source: usize) -> Power {
        range
            .channels()
            .map(|c| (self.power(c) - self.contribution(source, c)).max(Power::ZERO))
            .fold(Power::ZERO, Power::max)
    }

    pub fn is_busy(&self, channel: Channel, sensitivity: Db<Power>) -> bool {
        Db::from(self.power(channel)) > sensitivity
    }

    /// Updates the channel-free timestamps after the aggregate changed.
    pub fn update_free_since(&mut self, sensitivity: Db<Power>, now: Time) {
        for c in 0..self.power.len() {
            if self.is_busy(Channel(c), sensitivity) {
                self.free_since[c] = None;
            } else if self.free_since[c].is_none() {
                self.free_since[c] = Some(now);
            }
        }
    }

    pub fn free_since(&self, channel: Channel) -> Option<Time> {
        self.free_since[channel.0]
    }

    /// Instantaneous occupancy of every channel in `allowed`, indexed by channel.
    /// Channels outside `allowed` are reported busy. With `pifs` set, a non-primary channel must also
    /// have been free for at least that long.
    pub fn free_channels(
        &self,
        allowed: ChannelRange,
        primary: Channel,
        sensitivity: Db<Power>,
        now: Time,
        pifs: Option<Time>,
    ) -> Vec<bool> {
        (0..self.power.len())
            .map(Channel)
            .map(|c| {
                if !allowed.contains(c) || self.is_busy(c, sensitivity) {
                    return false;
                }

                match (pifs, c == primary) {
                    (Some(pifs), false) => self
                        .free_since(c)
                        .is_some_and(|since| now - since >= pifs),
                    _ => true,
                }
            })
            .collect()
    }
}

/// Signal to interference plus noise ratio, linear.
pub fn sinr(signal: Power, noise: Power, interference: Power) -> f64 {
    signal / (noise + interference)
}

#[cfg(test)]
mod tests {
    use super::models::{AdjustedFreeSpacePathLoss, IndoorOffice, OkumuraHata, free_space_path_loss};
    use crate::{assert_close, units::Dbm};

    use super::*;

    fn contribution(model: &PropagationModel, from: Position, to: Position, range: ChannelRange) -> Vec<Power> {
        let per_channel = Dbm::from_dbm(20.0) - Dbf::from_unit(range.width() as f64);
        let received = model.received_power(per_channel, Dbf::from_db_value(0.0), from, to);
        model.spread(received, range, 8)
    }

    #[test]
    fn start_finish_round_trip() {
        let models: Vec<PathlossModel> = vec![
            free_space_path_loss().into(),
            AdjustedFreeSpacePathLoss {
                distance_exponent: 3.1,
                other_loss_or_gain: Dbf::from_db_value(3.0),
            }
            .into(),
            OkumuraHata::default().into(),
            IndoorOffice::default().into(),
        ];

        let rx = Position::new(0.0, 0.0, 0.0);
        let senders = [
            (1, Position::new(13.0, 7.0, 0.0), ChannelRange::new(0, 3)),
            (4, Position::new(-31.0, 2.5, 1.0), ChannelRange::new(2, 2)),
            (2, Position::new(5.5, -90.0, 0.0), ChannelRange::new(4, 7)),
            (7, Position::new(0.3, 0.1, 0.0), ChannelRange::new(0, 7)),
        ];

        for path_loss in models {
            for adjacent_channel in [
                AdjacentChannelModel::None,
                AdjacentChannelModel::Boundary,
                AdjacentChannelModel::Extreme,
            ] {
                let model = PropagationModel {
                    path_loss: path_loss.clone(),
                    adjacent_channel,
                    central_frequency: Frequency::from_GHz(5.0),
                };

                let mut view = ChannelView::new(8);
                for (n, (id, pos, range)) in senders.iter().enumerate() {
                    let before = view.powers().to_vec();
                    view.add_transmitter(*id, contribution(&model, *pos, rx, *range));
                    assert_ne!(before, view.powers());

                    // Everything that started after this one finishes first
                    let mut nested = view.clone();
                    let inner_before = nested.powers().to_vec();
                    for (inner_id, inner_pos, inner_range) in senders.iter().skip(n + 1) {
                        nested.add_transmitter(*inner_id, contribution(&model, *inner_pos, rx, *inner_range));
                    }
                    for (inner_id, _, _) in senders.iter().skip(n + 1).rev() {
                        nested.remove_transmitter(*inner_id);
                    }
                    assert_eq!(inner_before, nested.powers());
                }

                for (id, _, _) in senders.iter() {
                    view.remove_transmitter(*id);
                }
                assert!(view.powers().iter().all(|x| *x == Power::ZERO));
            }
        }
    }

    #[test]
    fn interference_excludes_source() {
        let mut view = ChannelView::new(4);
        view.add_transmitter(0, vec![Power::from_picowatts(10.0); 4]);
        view.add_transmitter(
            1,
            vec![
                Power::from_picowatts(1.0),
                Power::from_picowatts(3.0),
                Power::ZERO,
                Power::ZERO,
            ],
        );

        assert_close(
            view.max_interference(ChannelRange::new(0, 1), 0),
            Power::from_picowatts(3.0),
        );
        assert_close(
            view.max_interference(ChannelRange::new(0, 3), 1),
            Power::from_picowatts(10.0),
        );
        assert_eq!(view.max_interference(ChannelRange::new(2, 3), 0), Power::ZERO);
    }

    #[test]
    fn sinr_is_linear_ratio() {
        let value = sinr(
            Power::from_picowatts(100.0),
            Power::from_picowatts(1.0),
            Power::from_picowatts(9.0),
        );
        assert_close(value, 10.0);
    }

    #[test]
    fn free_timestamps_follow_busy_periods() {
        let cca = Dbm::from_dbm(-82.0);
        let loud = Dbm::from_dbm(-60.0).as_linear();

        let mut view = ChannelView::new(2);
        view.add_transmitter(3, vec![loud, Power::ZERO]);
        view.update_free_since(cca, Time::from_micros(10.0));
        assert_eq!(view.free_since(Channel(0)), None);
        assert_eq!(view.free_since(Channel(1)), Some(Time::ZERO));

        view.remove_transmitter(3);
        view.update_free_since(cca, Time::from_micros(50.0));
        view.update_free_since(cca, Time::from_micros(70.0));
        assert_eq!(view.free_since(Channel(0)), Some(Time::from_micros(50.0)));
    }

    #[test]
    fn pifs_occupancy() {
        let cca = Dbm::from_dbm(-82.0);
        let loud = Dbm::from_dbm(-60.0).as_linear();
        let pifs = Time::from_micros(25.0);

        let mut view = ChannelView::new(4);
        view.add_transmitter(9, vec![Power::ZERO, loud, loud, Power::ZERO]);
        view.update_free_since(cca, Time::from_micros(100.0));
        view.remove_transmitter(9);
        view.update_free_since(cca, Time::from_micros(200.0));

        let allowed = ChannelRange::new(0, 3);
        let now = Time::from_micros(210.0);
        assert_eq!(
            view.free_channels(allowed, Channel(1), cca, now, Some(pifs)),
            vec![true, true, false, true]
        );
        assert_eq!(
            view.free_channels(allowed, Channel(1), cca, now, None),
            vec![true; 4]
        );
        assert_eq!(
            view.free_channels(ChannelRange::new(0, 1), Channel(0), cca, now, None),
            vec![true, true, false, false]
        );
    }

    #[test]
    fn range_helpers() {
        let range = ChannelRange::new(2, 5);
        assert_eq!(range.width(), 4);
        assert_eq!(range.width_index(), 2);
        assert_eq!(range.separation(Channel(0)), 2);
        assert_eq!(range.separation(Channel(3)), 0);
        assert_eq!(range.separation(Channel(7)), 2);
        assert!(range.contains_range(ChannelRange::new(3, 4)));
        assert!(!range.contains_range(ChannelRange::new(1, 4)));
        assert_eq!(range.channels().count(), 4);
    }
}
