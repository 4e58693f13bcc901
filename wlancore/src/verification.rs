//! Verifications / tests to be run on simulation results to make sure the simulator is working correctly.
//! Each public function, other than [`verify_all`], represents some property that should hold for all simulation results.

use crate::analysis::RunAnalysis;

pub fn verify_all(analysis: &RunAnalysis) -> bool {
    no_overlapping_transmission(analysis)
        && contention_window_within_bounds(analysis)
        && losses_never_exceed_attempts(analysis)
}

/// No node can make more than one transmission at a time.
///
/// For all non-equal transmissions if they have the same sender they cannot overlap.
pub fn no_overlapping_transmission(analysis: &RunAnalysis) -> bool {
    for (n, trans_a) in analysis.transmissions.iter().enumerate() {
        // Sorted by start time, so only later transmissions can overlap this one.
        for trans_b in analysis.transmissions[n + 1..].iter() {
            if trans_b.start_time >= trans_a.end_time {
                break;
            }

            if trans_a.transmitter_id == trans_b.transmitter_id && trans_a.overlaps(trans_b) {
                eprintln!("Overlapping transmission");
                eprintln!("= First = {trans_a:#?} \n = Second = \n {trans_b:#?}");
                return false;
            }
        }
    }

    true
}

/// Every contention window ends inside `[cw_min, cw_min * 2^max_stage]`.
pub fn contention_window_within_bounds(analysis: &RunAnalysis) -> bool {
    for report in analysis.reports.iter() {
        if report.final_cw < report.cw_min || report.final_cw > report.cw_max {
            eprintln!(
                "Contention window {} of node {} outside [{}, {}]",
                report.final_cw, report.node_id, report.cw_min, report.cw_max
            );
            return false;
        }
    }

    true
}

/// Acknowledged and lost DATA frames never outnumber the ones sent.
pub fn losses_never_exceed_attempts(analysis: &RunAnalysis) -> bool {
    for report in analysis.reports.iter() {
        let stats = &report.stats;

        if stats.data_packets_lost + stats.data_packets_acked > stats.data_packets_sent {
            eprintln!("Node {} lost more than it sent", report.node_id);
            eprintln!("{stats:#?}");
            return false;
        }
    }

    true
}
