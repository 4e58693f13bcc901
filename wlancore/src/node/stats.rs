use serde::{Deserialize, Serialize};

use crate::{
    channel::ChannelRange,
    mcs::NUM_WIDTHS,
    notification::LossReason,
    scenario::NodeRole,
    units::Time,
};

/// Counters a node keeps over a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStats {
    pub data_packets_sent: u32,
    pub data_packets_lost: u32,
    pub data_packets_acked: u32,

    pub rts_cts_sent: u32,
    pub rts_cts_lost: u32,
    /// Backoff collision NACKs naming this node.
    pub rts_lost_slotted_bo: u32,

    /// Indexed by [`LossReason::index`].
    pub nacks_received: [u32; LossReason::COUNT],
    pub nacks_sent: u32,

    /// Expired backoffs.
    pub tx_init_tried: u32,
    /// Expired backoffs after which no channel range was usable.
    pub tx_init_not_possible: u32,
    pub trials_per_width: [u32; NUM_WIDTHS],

    pub time_tx_per_channel: Vec<Time>,
    pub time_lost_per_channel: Vec<Time>,
    pub time_tx_per_width: Vec<Time>,
    pub time_lost_per_width: Vec<Time>,
    pub time_in_nav: Time,

    pub packets_generated: u32,
    pub packets_dropped: u32,
    /// Acknowledged packets whose queueing plus exchange delay was measured.
    pub delay_measurements: u32,
    pub sum_delays: Time,
    pub mcs_negotiations: u32,

    /// Indexed like `Wlan::sta_ids`. Only access points fill these in.
    pub per_sta: Vec<StaCounters>,
}

/// Exchange counters of an access point towards one of its stations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaCounters {
    pub rts_cts_sent: u32,
    pub rts_cts_lost: u32,
    pub data_packets_sent: u32,
    pub data_packets_lost: u32,
    pub data_packets_acked: u32,
}

impl NodeStats {
    pub fn new(num_channels: usize, stations: usize) -> Self {
        Self {
            data_packets_sent: 0,
            data_packets_lost: 0,
            data_packets_acked: 0,
            rts_cts_sent: 0,
            rts_cts_lost: 0,
            rts_lost_slotted_bo: 0,
            nacks_received: [0; LossReason::COUNT],
            nacks_sent: 0,
            tx_init_tried: 0,
            tx_init_not_possible: 0,
            trials_per_width: [0; NUM_WIDTHS],
            time_tx_per_channel: vec![Time::ZERO; num_channels],
            time_lost_per_channel: vec![Time::ZERO; num_channels],
            time_tx_per_width: vec![Time::ZERO; NUM_WIDTHS],
            time_lost_per_width: vec![Time::ZERO; NUM_WIDTHS],
            time_in_nav: Time::ZERO,
            packets_generated: 0,
            packets_dropped: 0,
            delay_measurements: 0,
            sum_delays: Time::ZERO,
            mcs_negotiations: 0,
            per_sta: vec![StaCounters::default(); stations],
        }
    }

    pub fn record_tx(&mut self, range: ChannelRange, duration: Time) {
        for channel in range.channels() {
            self.time_tx_per_channel[channel.0] = self.time_tx_per_channel[channel.0] + duration;
        }
        let width = range.width_index();
        self.time_tx_per_width[width] = self.time_tx_per_width[width] + duration;
    }

    pub fn record_lost(&mut self, range: ChannelRange, duration: Time) {
        for channel in range.channels() {
            self.time_lost_per_channel[channel.0] = self.time_lost_per_channel[channel.0] + duration;
        }
        let width = range.width_index();
        self.time_lost_per_width[width] = self.time_lost_per_width[width] + duration;
    }

    pub fn record_delay(&mut self, delay: Time) {
        self.delay_measurements += 1;
        self.sum_delays = self.sum_delays + delay;
    }

    /// Mean time from a packet arriving in the buffer to its ACK, `None` without measurements.
    pub fn average_delay(&self) -> Option<Time> {
        (self.delay_measurements > 0).then(|| self.sum_delays / self.delay_measurements as f64)
    }

    pub fn nacks(&self, reason: LossReason) -> u32 {
        self.nacks_received[reason.index()]
    }

    /// Delivered payload in bits per second.
    pub fn throughput(&self, payload_bits: f64, duration: Time) -> f64 {
        let delivered = self.data_packets_sent.saturating_sub(self.data_packets_lost) as f64;
        delivered * payload_bits / duration.seconds()
    }

    /// [`Self::throughput`] split by station.
    pub fn throughput_per_sta(&self, payload_bits: f64, duration: Time) -> Vec<f64> {
        self.per_sta
            .iter()
            .map(|x| {
                let delivered = x.data_packets_sent.saturating_sub(x.data_packets_lost) as f64;
                delivered * payload_bits / duration.seconds()
            })
            .collect()
    }

    pub fn prob_slotted_bo_collision(&self) -> f64 {
        if self.rts_cts_sent == 0 {
            0.0
        } else {
            self.rts_lost_slotted_bo as f64 / self.rts_cts_sent as f64
        }
    }
}

/// End of run summary of one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeReport {
    pub node_id: usize,
    pub code: String,
    pub role: NodeRole,
    pub wlan: String,

    /// Bits per second.
    pub throughput: f64,
    /// Bits per second towards each station of the WLAN, empty for stations.
    pub throughput_per_sta: Vec<f64>,
    pub prob_slotted_bo_collision: f64,

    pub final_cw: u32,
    pub cw_min: u32,
    pub cw_max: u32,

    pub hidden_nodes: Vec<usize>,
    pub unreachable: Vec<usize>,

    pub stats: NodeStats,
}

#[cfg(test)]
mod tests {
    use crate::assert_close;

    use super::*;

    #[test]
    fn time_accounting() {
        let mut stats = NodeStats::new(4, 1);
        stats.record_tx(ChannelRange::new(2, 3), Time::from_micros(10.0));
        stats.record_tx(ChannelRange::new(2, 2), Time::from_micros(5.0));
        stats.record_lost(ChannelRange::new(2, 3), Time::from_micros(10.0));
        stats.record_lost(ChannelRange::new(0, 3), Time::from_micros(4.0));
        stats.record_lost(ChannelRange::new(3, 3), Time::from_micros(1.0));

        assert_close(stats.time_tx_per_channel[2], Time::from_micros(15.0));
        assert_close(stats.time_tx_per_channel[3], Time::from_micros(10.0));
        assert_eq!(stats.time_tx_per_channel[0], Time::ZERO);
        assert_close(stats.time_tx_per_width[1], Time::from_micros(10.0));
        assert_close(stats.time_lost_per_channel[3], Time::from_micros(15.0));
        assert_close(stats.time_lost_per_channel[0], Time::from_micros(4.0));

        assert_close(stats.time_lost_per_width[0], Time::from_micros(1.0));
        assert_close(stats.time_lost_per_width[1], Time::from_micros(10.0));
        assert_close(stats.time_lost_per_width[2], Time::from_micros(4.0));
        assert_eq!(stats.time_lost_per_width[3], Time::ZERO);
    }

    #[test]
    fn delay_average() {
        let mut stats = NodeStats::new(1, 1);
        assert_eq!(stats.average_delay(), None);

        stats.record_delay(Time::from_micros(100.0));
        stats.record_delay(Time::from_micros(300.0));
        assert_eq!(stats.delay_measurements, 2);
        assert_close(stats.average_delay().expect("measured"), Time::from_micros(200.0));
    }

    #[test]
    fn throughput_counts_delivered_frames() {
        let mut stats = NodeStats::new(1, 2);
        stats.data_packets_sent = 10;
        stats.data_packets_lost = 2;
        assert_close(stats.throughput(12000.0, Time::from_seconds(2.0)), 48000.0);

        stats.per_sta[0].data_packets_sent = 6;
        stats.per_sta[0].data_packets_lost = 2;
        stats.per_sta[1].data_packets_sent = 4;
        let per_sta = stats.throughput_per_sta(12000.0, Time::from_seconds(2.0));
        assert_close(per_sta[0], 24000.0);
        assert_close(per_sta[1], 24000.0);

        assert_eq!(stats.prob_slotted_bo_collision(), 0.0);
        stats.rts_cts_sent = 8;
        stats.rts_lost_slotted_bo = 2;
        assert_close(stats.prob_slotted_bo_collision(), 0.25);
    }
}
