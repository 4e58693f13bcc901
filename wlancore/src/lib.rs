//! Discrete event simulation of dense IEEE 802.11 WLANs.
//!
//! Every node runs the CSMA/CA state machine in [`node`] with RTS/CTS, NAV deferral, binary
//! exponential backoff and dynamic channel bonding. Nodes only see each other through the
//! notifications delivered by [`simulation::Simulation`]; each keeps its own view of the band.
//!
//! ## Running
//! Build or load a [`scenario::Scenario`], check it with [`scenario::Scenario::validate`] and hand
//! it to [`simulation::run_simulation`]. The returned [`sim_file::SimOutput`] holds a report per node,
//! every transmission and the logs, and can be summarised with [`analysis::RunAnalysis`].

pub mod analysis;
pub mod channel;
pub mod classifier;
pub mod mcs;
pub mod node;
pub mod notification;
pub mod position;
pub mod scenario;
pub mod scheduler;
pub mod sim_file;
pub mod simulation;
pub mod timing;
pub mod units;
pub mod verification;

use std::fmt::Debug;

/// Checks two values are within 0.001% of each other.
#[allow(unused)]
fn assert_close<T>(a: T, b: T)
where
    T: Into<f64> + Copy + Debug,
{
    let float_a: f64 = a.into();
    let float_b: f64 = b.into();

    if float_a == 0. || float_b == 0. {
        assert!(float_a == float_b, "{a:?} and {b:?} are not close.");
        return;
    }

    let percent_diff = (float_a - float_b).abs() / float_a.abs();

    assert!(percent_diff < 0.00001, "{a:?} and {b:?} are not close.");
}
