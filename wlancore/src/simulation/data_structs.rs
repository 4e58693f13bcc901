use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    channel::ChannelRange,
    mcs::McsPerWidth,
    notification::{LogicalNack, LossReason, Notification, PacketType},
    units::*,
};

/// What a node hands to the bus. Delivered to every other node before the next timer fires.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    TxStart(Notification),
    TxFinish(Notification),
    Nack(LogicalNack),
}

impl BusMessage {
    pub fn source(&self) -> usize {
        match self {
            BusMessage::TxStart(notification) | BusMessage::TxFinish(notification) => {
                notification.source
            }
            BusMessage::Nack(nack) => nack.source,
        }
    }
}

/// A frame as it was actually on the air.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transmission {
    pub id: u32,
    pub transmitter_id: usize,
    pub destination_id: usize,
    pub packet_type: PacketType,
    pub packet_id: u64,
    pub range: ChannelRange,

    pub start_time: Time,
    pub end_time: Time,
}

impl Transmission {
    pub fn airtime(&self) -> Time {
        self.end_time - self.start_time
    }

    pub fn overlaps(&self, other: &Transmission) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
    pub time: Time,
    pub log_level: LogLevel,
    pub source: LogSource,
    pub content: LogContent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogSource {
    Simulation,
    Node(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LogContent {
    Text(String),
    TransmissionStarted {
        transmitter_id: usize,
        transmission_id: u32,
        packet_type: PacketType,
        range: ChannelRange,
    },
    NackSent {
        sender_id: usize,
        packet_type: PacketType,
        packet_id: u64,
        node_a: usize,
        node_b: Option<usize>,
        reason: LossReason,
    },
    McsNegotiated {
        node_id: usize,
        destination_id: usize,
        mcs: McsPerWidth,
        tx_power: Db<Power>,
    },
    DestinationUnreachable {
        node_id: usize,
        destination_id: usize,
    },
    HiddenNodeDetected {
        node_id: usize,
        hidden_id: usize,
    },
}

impl Display for LogContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogContent::Text(text) => text.fmt(f),
            LogContent::TransmissionStarted {
                transmitter_id,
                transmission_id,
                packet_type,
                range,
            } => write!(
                f,
                "Transmission {} ({}) started by node {} on {}",
                transmission_id, packet_type, transmitter_id, range
            ),
            LogContent::NackSent {
                sender_id,
                packet_type,
                packet_id,
                node_a,
                node_b,
                reason,
            } => {
                write!(
                    f,
                    "Node {} lost {} {} from node {} ({})",
                    sender_id, packet_type, packet_id, node_a, reason
                )?;
                match node_b {
                    Some(other) => write!(f, ", also implicating node {}", other),
                    None => Ok(()),
                }
            }
            LogContent::McsNegotiated {
                node_id,
                destination_id,
                mcs,
                tx_power,
            } => {
                let table: Vec<_> = mcs
                    .iter()
                    .map(|x| x.map(|m| m.index().to_string()).unwrap_or("-".to_owned()))
                    .collect();
                write!(
                    f,
                    "Node {} uses MCS [{}] towards node {} at {:.1} dBm",
                    node_id,
                    table.join(", "),
                    destination_id,
                    tx_power.dbm()
                )
            }
            LogContent::DestinationUnreachable {
                node_id,
                destination_id,
            } => write!(
                f,
                "Node {} cannot reach node {} at maximum power",
                node_id, destination_id
            ),
            LogContent::HiddenNodeDetected { node_id, hidden_id } => {
                write!(f, "Node {} detected hidden node {}", node_id, hidden_id)
            }
        }
    }
}
