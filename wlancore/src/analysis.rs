use serde::{Deserialize, Serialize};

use crate::{
    mcs::NUM_WIDTHS,
    node::stats::NodeReport,
    notification::{LossReason, PacketType},
    scenario::NodeRole,
    sim_file::{OutputIdentity, SimOutput},
    simulation::data_structs::{LogContent, LogItem, LogSource, Transmission},
    units::Time,
};

/// Network wide figures of one run.
pub struct RunAnalysis {
    pub reports: Vec<NodeReport>,

    /// Lists of log items for each node.
    /// Outer vec is nodes (index is node id).
    pub node_events: Vec<Vec<LogItem>>,

    /// List of log items with [`LogSource::Simulation`]
    pub sim_events: Vec<LogItem>,

    /// List of transmissions ordered by start time.
    pub transmissions: Vec<Transmission>,

    /// Sum of the air time of all transmissions.
    pub total_airtime: Time,

    /// Sum of the throughput of every access point, bits per second.
    pub aggregate_throughput: f64,
    /// Jain's fairness index over the throughput of the access points.
    pub jain_fairness: f64,
    /// Share of all RTS frames that were lost to a backoff collision.
    pub prob_slotted_bo_collision: f64,
    /// Mean packet delay over every node that measured one.
    pub average_delay: Option<Time>,
    /// Air time of lost frames summed over all nodes, indexed by bonding width.
    pub time_lost_per_width: Vec<Time>,

    pub loss_breakdown: LossBreakdown,

    pub complete_identity: OutputIdentity,
}

impl RunAnalysis {
    pub fn new(results: SimOutput) -> RunAnalysis {
        let node_count = results.reports.len();

        let mut node_events = vec![Vec::new(); node_count];
        let mut sim_events = Vec::new();

        for event in results.logs {
            match event.source {
                LogSource::Simulation => sim_events.push(event),
                LogSource::Node(node_id) => node_events[node_id].push(event),
            }
        }

        sim_events.sort_by(|x, y| f64::total_cmp(&x.time.seconds(), &y.time.seconds()));
        node_events.iter_mut().for_each(|list| {
            list.sort_by(|x, y| f64::total_cmp(&x.time.seconds(), &y.time.seconds()))
        });

        let mut transmissions = results.transmissions;
        transmissions
            .sort_by(|x, y| f64::total_cmp(&x.start_time.seconds(), &y.start_time.seconds()));

        let total_airtime = transmissions.iter().map(|x| x.airtime()).sum::<Time>();

        let ap_throughputs: Vec<f64> = results
            .reports
            .iter()
            .filter(|x| x.role == NodeRole::Ap)
            .map(|x| x.throughput)
            .collect();

        let aggregate_throughput = ap_throughputs.iter().sum();
        let jain_fairness = jain_fairness(&ap_throughputs);

        let (rts_sent, rts_bo_lost) = results
            .reports
            .iter()
            .fold((0, 0), |(sent, lost), x| {
                (sent + x.stats.rts_cts_sent, lost + x.stats.rts_lost_slotted_bo)
            });

        let prob_slotted_bo_collision = if rts_sent == 0 {
            0.0
        } else {
            rts_bo_lost as f64 / rts_sent as f64
        };

        let (delay_sum, delay_count) = results
            .reports
            .iter()
            .fold((Time::ZERO, 0), |(sum, count), x| {
                (sum + x.stats.sum_delays, count + x.stats.delay_measurements)
            });
        let average_delay = (delay_count > 0).then(|| delay_sum / delay_count as f64);

        let mut time_lost_per_width = vec![Time::ZERO; NUM_WIDTHS];
        for report in results.reports.iter() {
            for (total, lost) in time_lost_per_width
                .iter_mut()
                .zip(&report.stats.time_lost_per_width)
            {
                *total = *total + *lost;
            }
        }

        let loss_breakdown = LossBreakdown::new(&sim_events);

        RunAnalysis {
            reports: results.reports,
            node_events,
            sim_events,
            transmissions,
            total_airtime,
            aggregate_throughput,
            jain_fairness,
            prob_slotted_bo_collision,
            average_delay,
            time_lost_per_width,
            loss_breakdown,
            complete_identity: results.complete_identity,
        }
    }
}

/// NACKs of a run counted by reason and by the kind of frame that was lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    /// Indexed by [`LossReason::index`].
    pub by_reason: [u32; LossReason::COUNT],
    pub rts: u32,
    pub cts: u32,
    pub data: u32,
    pub ack: u32,
}

impl LossBreakdown {
    /// Built from the NACK records of the simulation log.
    pub fn new(sim_events: &[LogItem]) -> LossBreakdown {
        let mut breakdown = LossBreakdown {
            by_reason: [0; LossReason::COUNT],
            rts: 0,
            cts: 0,
            data: 0,
            ack: 0,
        };

        for event in sim_events {
            let LogContent::NackSent {
                packet_type,
                reason,
                ..
            } = event.content
            else {
                continue;
            };

            breakdown.by_reason[reason.index()] += 1;
            match packet_type {
                PacketType::Rts => breakdown.rts += 1,
                PacketType::Cts => breakdown.cts += 1,
                PacketType::Data => breakdown.data += 1,
                PacketType::Ack => breakdown.ack += 1,
                PacketType::McsRequest | PacketType::McsResponse => (),
            }
        }

        breakdown
    }

    pub fn count(&self, reason: LossReason) -> u32 {
        self.by_reason[reason.index()]
    }

    pub fn total(&self) -> u32 {
        self.by_reason.iter().sum()
    }
}

/// `(Σx)² / (n·Σx²)`, 1 when every value is the same and `1/n` when a single one gets everything.
/// An empty or all zero set counts as fair.
pub fn jain_fairness(values: &[f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    let sum_squares: f64 = values.iter().map(|x| x * x).sum();

    if sum_squares == 0.0 {
        1.0
    } else {
        sum * sum / (values.len() as f64 * sum_squares)
    }
}

#[cfg(test)]
mod tests {
    use crate::{assert_close, simulation::data_structs::LogLevel};

    use super::*;

    #[test]
    fn fairness_bounds() {
        assert_close(jain_fairness(&[5.0, 5.0, 5.0]), 1.0);
        assert_close(jain_fairness(&[9.0, 0.0, 0.0]), 1.0 / 3.0);
        assert_close(jain_fairness(&[1.0, 3.0]), 16.0 / 20.0);
        assert_eq!(jain_fairness(&[]), 1.0);
    }

    #[test]
    fn breakdown_counts_nacks_only() {
        let nack = |packet_type, reason| LogItem {
            time: Time::ZERO,
            log_level: LogLevel::Debug,
            source: LogSource::Simulation,
            content: LogContent::NackSent {
                sender_id: 1,
                packet_type,
                packet_id: 0,
                node_a: 0,
                node_b: None,
                reason,
            },
        };

        let events = vec![
            nack(PacketType::Rts, LossReason::LostBoCollision),
            nack(PacketType::Rts, LossReason::LostBoCollision),
            nack(PacketType::Cts, LossReason::LostInterference),
            LogItem {
                time: Time::ZERO,
                log_level: LogLevel::Info,
                source: LogSource::Simulation,
                content: LogContent::Text("unrelated".to_owned()),
            },
        ];

        let breakdown = LossBreakdown::new(&events);
        assert_eq!(breakdown.total(), 3);
        assert_eq!(breakdown.count(LossReason::LostBoCollision), 2);
        assert_eq!(breakdown.rts, 2);
        assert_eq!(breakdown.cts, 1);
        assert_eq!(breakdown.data, 0);
    }
}
