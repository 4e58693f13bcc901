//! Values exchanged between nodes: transmission start/finish notifications and logical NACKs.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    channel::ChannelRange,
    mcs::{FrameDurations, McsPerWidth},
    position::Position,
    units::{DataRate, Db, Dbf, Power, Time},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    Rts,
    Cts,
    Data,
    Ack,
    McsRequest,
    McsResponse,
}

impl Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketType::Rts => "RTS",
            PacketType::Cts => "CTS",
            PacketType::Data => "DATA",
            PacketType::Ack => "ACK",
            PacketType::McsRequest => "MCS request",
            PacketType::McsResponse => "MCS response",
        };
        f.write_str(name)
    }
}

/// A frame going on or off the air, as every other node observes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub packet_type: PacketType,
    pub source: usize,
    pub destination: usize,
    pub range: ChannelRange,
    pub packet_id: u64,

    /// Air time of this frame.
    pub tx_duration: Time,
    /// Air times of every frame of the exchange this frame belongs to.
    pub durations: FrameDurations,
    /// Reservation carried by RTS and CTS frames, zero otherwise.
    pub nav_time: Time,

    /// Transmit power on each channel of `range`.
    pub tx_power: Db<Power>,
    pub tx_gain: Dbf,
    pub position: Position,

    pub timestamp: Time,
    pub packet_length: f64,
    pub data_rate: DataRate,

    /// Only set on MCS responses.
    pub mcs_response: Option<McsPerWidth>,
}

impl Notification {
    pub fn is_reservation(&self) -> bool {
        matches!(self.packet_type, PacketType::Rts | PacketType::Cts)
    }
}

/// Why a frame could not be received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossReason {
    NotLost,
    /// SINR below the capture effect threshold.
    LostInterference,
    /// Two contenders ended their backoff in the same slot.
    LostBoCollision,
    /// Frame addressed to a node that was deferring on a reservation.
    LostRxInNav,
    /// Frame addressed to a node that was transmitting.
    LostDestinationTx,
    /// A second frame for the same receiver destroyed the one being received.
    LostPureCollision,
    /// A second frame for the same receiver could not be picked up because another was being received.
    LostLowSignalAndRx,
    /// Receiver's primary channel is not in the frame's range.
    LostOutsideChRange,
    /// Received power below the receiver's sensitivity.
    LostLowSignal,
}

impl LossReason {
    pub const COUNT: usize = 9;

    pub const ALL: [LossReason; Self::COUNT] = [
        LossReason::NotLost,
        LossReason::LostInterference,
        LossReason::LostBoCollision,
        LossReason::LostRxInNav,
        LossReason::LostDestinationTx,
        LossReason::LostPureCollision,
        LossReason::LostLowSignalAndRx,
        LossReason::LostOutsideChRange,
        LossReason::LostLowSignal,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_lost(self) -> bool {
        self != LossReason::NotLost
    }
}

impl Display for LossReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LossReason::NotLost => "not lost",
            LossReason::LostInterference => "interference",
            LossReason::LostBoCollision => "backoff collision",
            LossReason::LostRxInNav => "receiver in NAV",
            LossReason::LostDestinationTx => "destination transmitting",
            LossReason::LostPureCollision => "pure collision",
            LossReason::LostLowSignalAndRx => "low signal while receiving",
            LossReason::LostOutsideChRange => "outside channel range",
            LossReason::LostLowSignal => "low signal",
        };
        f.write_str(text)
    }
}

/// Feedback about a lost frame. Only used for statistics and hidden node detection,
/// retransmissions are driven by timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalNack {
    pub packet_type: PacketType,
    pub packet_id: u64,
    /// Node that detected the loss.
    pub source: usize,
    /// Transmitter of the lost frame.
    pub node_a: usize,
    /// Second node involved, usually the interferer.
    pub node_b: Option<usize>,
    pub reason: LossReason,
    /// Linear SINR at detection.
    pub sinr: f64,
    pub per: f64,
}

impl LogicalNack {
    pub fn implicates(&self, node_id: usize) -> bool {
        self.node_a == node_id || self.node_b == Some(node_id)
    }

    /// The implicated node that is not `node_id`, if there is one.
    pub fn other_than(&self, node_id: usize) -> Option<usize> {
        if self.node_a == node_id {
            self.node_b
        } else {
            Some(self.node_a)
        }
    }
}
