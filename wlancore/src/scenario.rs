//! Static description of a run: system wide parameters, every node and how nodes group into WLANs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    channel::{Channel, ChannelRange, PropagationModel, bonding::ChannelBondingPolicy},
    mcs::{FrameLengths, Mcs, NUM_WIDTHS, PhyTiming},
    node::{
        backoff::{BackoffDistribution, BackoffType, CwAdaptation},
        traffic::TrafficModel,
    },
    position::Position,
    units::{Db, Dbf, Dbm, Frequency, Power, Time},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    /// Number of basic sub-channels in the band.
    pub num_channels: usize,
    pub basic_bandwidth: Frequency,

    pub sifs: Time,
    pub difs: Time,
    pub pifs: Time,
    /// Secondary channels must have been free for a PIFS before they are bonded.
    pub pifs_activated: bool,

    pub propagation: PropagationModel,
    /// Minimum SINR needed to decode a frame.
    pub capture_effect: Dbf,
    pub noise_level: Db<Power>,
    /// Constant packet error rate applied to frames that would otherwise be received.
    pub constant_per: f64,

    pub backoff_type: BackoffType,
    pub backoff_distribution: BackoffDistribution,
    pub cw_adaptation: CwAdaptation,

    pub phy_timing: PhyTiming,
    pub frame_lengths: FrameLengths,

    pub simulation_time: Time,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_channels: 8,
            basic_bandwidth: Frequency::from_MHz(20.0),
            sifs: Time::from_micros(16.0),
            difs: Time::from_micros(34.0),
            pifs: Time::from_micros(25.0),
            pifs_activated: false,
            propagation: PropagationModel::default(),
            capture_effect: Dbf::from_db_value(20.0),
            noise_level: Dbm::from_dbm(-95.0),
            constant_per: 0.0,
            backoff_type: BackoffType::default(),
            backoff_distribution: BackoffDistribution::default(),
            cw_adaptation: CwAdaptation::default(),
            phy_timing: PhyTiming::default(),
            frame_lengths: FrameLengths::default(),
            simulation_time: Time::from_seconds(10.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeRole {
    /// Contends for the medium and sends data to its stations.
    Ap,
    /// Answers its access point.
    Sta,
    /// Only listens, and answers frames addressed to it.
    Other,
}

/// A configurable level with the range it may be adjusted in during a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds<T> {
    pub min: T,
    pub default: T,
    pub max: T,
}

impl<T: Copy> Bounds<T> {
    pub fn fixed(value: T) -> Self {
        Self {
            min: value,
            default: value,
            max: value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub code: String,
    pub role: NodeRole,
    /// Index into [`Scenario::wlans`].
    pub wlan: usize,
    pub position: Position,

    pub primary_channel: Channel,
    pub allowed: ChannelRange,
    pub channel_bonding: ChannelBondingPolicy,

    /// Total transmit power, split evenly over the channels of a transmission.
    pub tx_power: Bounds<Db<Power>>,
    /// Carrier sense and decoding threshold.
    pub sensitivity: Db<Power>,
    pub tx_gain: Dbf,
    pub rx_gain: Dbf,

    /// Skips MCS negotiation and always transmits with this MCS.
    pub default_modulation: Option<Mcs>,

    pub traffic: TrafficModel,
    pub cw_min: u32,
    pub cw_max_stage: u32,

    /// Fixed destination for an access point, otherwise a random station of its WLAN per exchange.
    pub destination: Option<usize>,
}

impl NodeConfig {
    fn new(code: impl Into<String>, role: NodeRole, position: Position) -> Self {
        Self {
            code: code.into(),
            role,
            wlan: 0,
            position,
            primary_channel: Channel(0),
            allowed: ChannelRange::new(0, 0),
            channel_bonding: ChannelBondingPolicy::default(),
            tx_power: Bounds {
                min: Dbm::from_dbm(1.0),
                default: Dbm::from_dbm(20.0),
                max: Dbm::from_dbm(20.0),
            },
            sensitivity: Dbm::from_dbm(-82.0),
            tx_gain: Dbf::from_db_value(0.0),
            rx_gain: Dbf::from_db_value(0.0),
            default_modulation: None,
            traffic: TrafficModel::FullBuffer,
            cw_min: 16,
            cw_max_stage: 5,
            destination: None,
        }
    }

    pub fn ap(code: impl Into<String>, position: Position) -> Self {
        Self::new(code, NodeRole::Ap, position)
    }

    pub fn sta(code: impl Into<String>, position: Position) -> Self {
        Self::new(code, NodeRole::Sta, position)
    }

    pub fn other(code: impl Into<String>, position: Position) -> Self {
        Self::new(code, NodeRole::Other, position)
    }

    pub fn with_channels(mut self, primary: usize, allowed: ChannelRange) -> Self {
        self.primary_channel = Channel(primary);
        self.allowed = allowed;
        self
    }

    pub fn with_bonding(mut self, policy: ChannelBondingPolicy) -> Self {
        self.channel_bonding = policy;
        self
    }

    pub fn with_tx_power(mut self, power: Db<Power>) -> Self {
        self.tx_power = Bounds::fixed(power);
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Db<Power>) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_cw(mut self, cw_min: u32, cw_max_stage: u32) -> Self {
        self.cw_min = cw_min;
        self.cw_max_stage = cw_max_stage;
        self
    }

    pub fn with_traffic(mut self, traffic: TrafficModel) -> Self {
        self.traffic = traffic;
        self
    }

    pub fn with_modulation(mut self, mcs: Mcs) -> Self {
        self.default_modulation = Some(mcs);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wlan {
    pub code: String,
    pub ap_id: usize,
    pub sta_ids: Vec<usize>,
}

impl Wlan {
    /// Index of `sta` in this WLAN's MCS tables.
    pub fn sta_index(&self, sta: usize) -> Option<usize> {
        self.sta_ids.iter().position(|x| *x == sta)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub system: SystemConfig,
    pub nodes: Vec<NodeConfig>,
    pub wlans: Vec<Wlan>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("Scenario has no nodes")]
    NoNodes,
    #[error("Number of channels must be between 1 and {max}, was {found}")]
    ChannelCount { max: usize, found: usize },
    #[error("Simulation time must be positive")]
    SimulationTime,
    #[error("Node {node} refers to missing WLAN {wlan}")]
    MissingWlan { node: usize, wlan: usize },
    #[error("WLAN {wlan} refers to missing node {node}")]
    MissingNode { wlan: usize, node: usize },
    #[error("WLAN {wlan} lists node {node} as {expected:?} but it is configured differently")]
    RoleMismatch {
        wlan: usize,
        node: usize,
        expected: NodeRole,
    },
    #[error("Node {node} channels are invalid: primary {primary}, allowed {allowed}")]
    Channels {
        node: usize,
        primary: Channel,
        allowed: ChannelRange,
    },
    #[error("Node {node} transmit power bounds are not ordered")]
    PowerBounds { node: usize },
    #[error("Node {node} has an empty contention window")]
    ContentionWindow { node: usize },
    #[error("Node {node} cannot double its contention window {stage} times")]
    MaxStage { node: usize, stage: u32 },
    #[error("Node {node} needs a positive finite packet rate")]
    Traffic { node: usize },
    #[error("Node {node} has destination {destination} outside its WLAN")]
    Destination { node: usize, destination: usize },
    #[error("Packet error rate must lie in [0, 1), was {0}")]
    PacketErrorRate(f64),
}

impl Scenario {
    pub fn new(name: impl Into<String>, system: SystemConfig) -> Self {
        Self {
            name: name.into(),
            system,
            nodes: Vec::new(),
            wlans: Vec::new(),
        }
    }

    /// Adds an access point and its stations as a new WLAN, returns the WLAN index.
    /// Node ids are assigned in insertion order, the access point first.
    pub fn add_wlan(
        &mut self,
        code: impl Into<String>,
        mut ap: NodeConfig,
        stations: impl IntoIterator<Item = NodeConfig>,
    ) -> usize {
        let wlan = self.wlans.len();

        ap.wlan = wlan;
        let ap_id = self.nodes.len();
        self.nodes.push(ap);

        let mut sta_ids = Vec::new();
        for mut sta in stations {
            sta.wlan = wlan;
            sta_ids.push(self.nodes.len());
            self.nodes.push(sta);
        }

        self.wlans.push(Wlan {
            code: code.into(),
            ap_id,
            sta_ids,
        });

        wlan
    }

    pub fn wlan_of(&self, node_id: usize) -> &Wlan {
        &self.wlans[self.nodes[node_id].wlan]
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let system = &self.system;
        let max_channels = 1 << (NUM_WIDTHS - 1);

        if self.nodes.is_empty() {
            return Err(ScenarioError::NoNodes);
        }
        if system.num_channels == 0 || system.num_channels > max_channels {
            return Err(ScenarioError::ChannelCount {
                max: max_channels,
                found: system.num_channels,
            });
        }
        if system.simulation_time <= Time::ZERO {
            return Err(ScenarioError::SimulationTime);
        }
        if !(0.0..1.0).contains(&system.constant_per) {
            return Err(ScenarioError::PacketErrorRate(system.constant_per));
        }

        for (id, node) in self.nodes.iter().enumerate() {
            if node.wlan >= self.wlans.len() {
                return Err(ScenarioError::MissingWlan {
                    node: id,
                    wlan: node.wlan,
                });
            }

            if !node.allowed.contains(node.primary_channel)
                || node.allowed.right.0 >= system.num_channels
            {
                return Err(ScenarioError::Channels {
                    node: id,
                    primary: node.primary_channel,
                    allowed: node.allowed,
                });
            }

            let power = &node.tx_power;
            if power.min > power.default || power.default > power.max {
                return Err(ScenarioError::PowerBounds { node: id });
            }

            if node.cw_min == 0 {
                return Err(ScenarioError::ContentionWindow { node: id });
            }

            // The largest window is `cw_min << cw_max_stage` and must fit a u32.
            if node.cw_max_stage > node.cw_min.leading_zeros() {
                return Err(ScenarioError::MaxStage {
                    node: id,
                    stage: node.cw_max_stage,
                });
            }

            match node.traffic {
                TrafficModel::Poisson { lambda } | TrafficModel::Deterministic { lambda }
                    if !(lambda.is_finite() && lambda > 0.0) =>
                {
                    return Err(ScenarioError::Traffic { node: id });
                }
                _ => {}
            }

            if let Some(destination) = node.destination {
                let in_wlan = self.wlans[node.wlan].sta_ids.contains(&destination);
                if !in_wlan {
                    return Err(ScenarioError::Destination {
                        node: id,
                        destination,
                    });
                }
            }
        }

        for (n, wlan) in self.wlans.iter().enumerate() {
            let members = std::iter::once((wlan.ap_id, NodeRole::Ap))
                .chain(wlan.sta_ids.iter().map(|x| (*x, NodeRole::Sta)));

            for (id, expected) in members {
                let Some(node) = self.nodes.get(id) else {
                    return Err(ScenarioError::MissingNode { wlan: n, node: id });
                };

                if node.role != expected || node.wlan != n {
                    return Err(ScenarioError::RoleMismatch {
                        wlan: n,
                        node: id,
                        expected,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Scenario {
        let mut scenario = Scenario::new("pair", SystemConfig::default());
        scenario.add_wlan(
            "A",
            NodeConfig::ap("AP_A", Position::new(0.0, 0.0, 0.0)),
            [NodeConfig::sta("STA_A1", Position::new(5.0, 0.0, 0.0))],
        );
        scenario
    }

    #[test]
    fn builder_assigns_ids() {
        let mut scenario = pair();
        let wlan = scenario.add_wlan(
            "B",
            NodeConfig::ap("AP_B", Position::new(20.0, 0.0, 0.0)),
            [
                NodeConfig::sta("STA_B1", Position::new(21.0, 0.0, 0.0)),
                NodeConfig::sta("STA_B2", Position::new(22.0, 0.0, 0.0)),
            ],
        );

        assert_eq!(wlan, 1);
        assert_eq!(scenario.wlans[1].ap_id, 2);
        assert_eq!(scenario.wlans[1].sta_ids, vec![3, 4]);
        assert_eq!(scenario.wlan_of(4).code, "B");
        assert_eq!(scenario.wlans[1].sta_index(4), Some(1));
        assert_eq!(scenario.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_channels() {
        let mut scenario = pair();
        scenario.nodes[0].primary_channel = Channel(3);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Channels { node: 0, .. })
        ));

        let mut scenario = pair();
        scenario.system.num_channels = 1;
        scenario.nodes[1].allowed = ChannelRange::new(0, 1);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Channels { node: 1, .. })
        ));
    }

    #[test]
    fn rejects_inconsistent_wlans() {
        let mut scenario = pair();
        scenario.nodes[1].role = NodeRole::Other;
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::RoleMismatch {
                wlan: 0,
                node: 1,
                expected: NodeRole::Sta
            })
        );

        let mut scenario = pair();
        scenario.wlans[0].sta_ids.push(7);
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::MissingNode { wlan: 0, node: 7 })
        );

        let mut scenario = pair();
        scenario.nodes[0].destination = Some(0);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Destination { node: 0, .. })
        ));
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut scenario = pair();
        scenario.nodes[0].tx_power.min = Dbm::from_dbm(30.0);
        assert_eq!(scenario.validate(), Err(ScenarioError::PowerBounds { node: 0 }));

        let mut scenario = pair();
        scenario.nodes[0].cw_min = 0;
        assert_eq!(scenario.validate(), Err(ScenarioError::ContentionWindow { node: 0 }));

        let mut scenario = pair();
        scenario.nodes[0].cw_max_stage = 28;
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::MaxStage { node: 0, stage: 28 })
        );
        scenario.nodes[0].cw_max_stage = 27;
        assert_eq!(scenario.validate(), Ok(()));

        for lambda in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let mut scenario = pair();
            scenario.nodes[0].traffic = TrafficModel::Poisson { lambda };
            assert_eq!(scenario.validate(), Err(ScenarioError::Traffic { node: 0 }));

            scenario.nodes[0].traffic = TrafficModel::Deterministic { lambda };
            assert_eq!(scenario.validate(), Err(ScenarioError::Traffic { node: 0 }));
        }

        let mut scenario = pair();
        scenario.system.constant_per = 1.0;
        assert_eq!(scenario.validate(), Err(ScenarioError::PacketErrorRate(1.0)));

        assert_eq!(
            Scenario::new("empty", SystemConfig::default()).validate(),
            Err(ScenarioError::NoNodes)
        );
    }

    #[test]
    fn config_survives_encoding() {
        let scenario = pair();
        let bytes = rmp_serde::to_vec(&scenario).expect("serializable");
        let back: Scenario = rmp_serde::from_slice(&bytes).expect("deserializable");
        assert_eq!(back, scenario);

        let text = serde_json::to_string(&scenario).expect("serializable");
        let back: Scenario = serde_json::from_str(&text).expect("deserializable");
        assert_eq!(back.wlans, scenario.wlans);
        assert_eq!(back.nodes[1].code, "STA_A1");
    }
}
