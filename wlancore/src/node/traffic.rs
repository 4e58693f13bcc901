use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

use crate::units::Time;

/// Packets a node can queue. Arrivals beyond this are dropped.
pub const PACKET_BUFFER_SIZE: u32 = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum TrafficModel {
    /// Always has a packet ready, the buffer never drains.
    #[default]
    FullBuffer,
    /// Exponential gaps with rate `lambda` packets per second.
    Poisson { lambda: f64 },
    /// One packet every `1 / lambda` seconds.
    Deterministic { lambda: f64 },
}

impl TrafficModel {
    /// Time until the next packet arrives, `None` for a full buffer.
    pub fn next_arrival<R: Rng + ?Sized>(self, rng: &mut R) -> Option<Time> {
        match self {
            TrafficModel::FullBuffer => None,
            TrafficModel::Poisson { lambda } => {
                let gap = Exp::new(lambda).map(|x| x.sample(rng)).unwrap_or(f64::INFINITY);
                Some(Time::from_seconds(gap))
            }
            TrafficModel::Deterministic { lambda } => Some(Time::from_seconds(1.0 / lambda)),
        }
    }

    pub fn initial_buffer(self) -> u32 {
        match self {
            TrafficModel::FullBuffer => PACKET_BUFFER_SIZE,
            _ => 0,
        }
    }

    pub fn drains(self) -> bool {
        self != TrafficModel::FullBuffer
    }
}
