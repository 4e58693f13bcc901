//! The per-node CSMA/CA state machine.
//!
//! A [`Node`] only ever reacts to three kinds of input: its own timers firing ([`Node::on_timer`]),
//! another node starting or finishing a frame, and logical NACKs (see the `inbound` module).
//! Everything a node may touch outside itself goes through the [`Context`] it is handed.

pub mod backoff;
pub mod hidden;
mod inbound;
pub mod stats;
mod timers;
pub mod traffic;

#[cfg(test)]
mod tests;

use std::{collections::VecDeque, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::{
    channel::{Channel, ChannelRange, ChannelView, sinr},
    classifier::{Reception, classify, per_hit},
    mcs::{FrameDurations, McsPerWidth, NUM_WIDTHS},
    notification::{LogicalNack, LossReason, Notification, PacketType},
    scenario::{NodeRole, Scenario},
    scheduler::TimerPurpose,
    simulation::{Context, data_structs::LogLevel},
    timing::TIME_OUT_EXTRA_TIME,
    units::{DataRate, Db, Dbf, Power, Time},
};

use backoff::{ContentionWindow, remaining_backoff};
use hidden::HiddenNodes;
use rand::Rng;
use stats::{NodeReport, NodeStats, StaCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Listening, and counting down the backoff if there is something to send.
    Sensing,
    TxRts,
    TxCts,
    TxData,
    TxAck,
    WaitCts,
    WaitData,
    WaitAck,
    RxRts,
    RxCts,
    RxData,
    RxAck,
    /// Deferring on a reservation made by someone else.
    Nav,
    /// Waiting out a collision before restarting.
    Sleep,
}

impl NodeState {
    pub fn is_transmitting(self) -> bool {
        matches!(
            self,
            NodeState::TxRts | NodeState::TxCts | NodeState::TxData | NodeState::TxAck
        )
    }

    pub fn is_receiving(self) -> bool {
        matches!(
            self,
            NodeState::RxRts | NodeState::RxCts | NodeState::RxData | NodeState::RxAck
        )
    }
}

impl Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: usize,
    state: NodeState,
    /// Access points generate traffic and contend, everything else only answers.
    is_transmitter: bool,

    view: ChannelView,
    /// In-range power per channel last received from each node.
    power_from: Vec<Power>,
    sensitivity: Db<Power>,
    tx_power: Db<Power>,

    remaining_backoff: Time,
    cw: ContentionWindow,
    buffer: u32,
    /// Arrival times of the buffered packets, oldest first. Empty under full buffer traffic.
    arrivals: VecDeque<Time>,
    /// Arrival time of the packet carried by the current DATA frame.
    in_flight_since: Option<Time>,
    packet_id: u64,

    // Current exchange
    destination: Option<usize>,
    range: ChannelRange,
    durations: FrameDurations,
    data_rate: DataRate,
    current_tx_duration: Time,
    nav_time: Time,
    on_air: Option<Notification>,
    /// RTS waiting for its preoccupancy delay.
    pending: Option<Notification>,
    incoming: Option<Notification>,
    nav_notification: Option<Notification>,
    /// Timestamp of the last reservation heard but not decoded.
    outrange_nav: Option<Time>,
    nav_since: Option<Time>,

    // Indexed like `Wlan::sta_ids`
    mcs: Vec<McsPerWidth>,
    mcs_stale: Vec<bool>,
    unreachable: Vec<bool>,

    hidden: HiddenNodes,
    pub stats: NodeStats,
}

impl Node {
    pub fn new(id: usize, scenario: &Scenario) -> Self {
        let config = &scenario.nodes[id];
        let node_count = scenario.nodes.len();
        let num_channels = scenario.system.num_channels;
        let stations = scenario.wlan_of(id).sta_ids.len();

        Self {
            id,
            state: NodeState::Sensing,
            is_transmitter: config.role == NodeRole::Ap,
            view: ChannelView::new(num_channels),
            power_from: vec![Power::ZERO; node_count],
            sensitivity: config.sensitivity,
            tx_power: config.tx_power.default,
            remaining_backoff: Time::ZERO,
            cw: ContentionWindow::new(config.cw_min, config.cw_max_stage),
            buffer: 0,
            arrivals: VecDeque::new(),
            in_flight_since: None,
            packet_id: 0,
            destination: None,
            range: ChannelRange::single(config.primary_channel),
            durations: FrameDurations::ZERO,
            data_rate: DataRate::from_bits_per_second(0.0),
            current_tx_duration: Time::ZERO,
            nav_time: Time::ZERO,
            on_air: None,
            pending: None,
            incoming: None,
            nav_notification: None,
            outrange_nav: None,
            nav_since: None,
            mcs: vec![[None; NUM_WIDTHS]; stations],
            mcs_stale: vec![true; stations],
            unreachable: vec![false; stations],
            hidden: HiddenNodes::new(node_count),
            stats: NodeStats::new(num_channels, stations),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn contention_window(&self) -> &ContentionWindow {
        &self.cw
    }

    pub fn remaining_backoff(&self) -> Time {
        self.remaining_backoff
    }

    pub fn buffer(&self) -> u32 {
        self.buffer
    }

    pub fn tx_power(&self) -> Db<Power> {
        self.tx_power
    }

    pub fn view(&self) -> &ChannelView {
        &self.view
    }

    pub fn hidden_nodes(&self) -> Vec<usize> {
        self.hidden.list()
    }

    /// Negotiated MCS table towards the `sta_index`th station of this node's WLAN.
    pub fn mcs_table(&self, sta_index: usize) -> Option<&McsPerWidth> {
        self.mcs.get(sta_index)
    }

    pub fn report(&self, scenario: &Scenario) -> NodeReport {
        let config = &scenario.nodes[self.id];
        let wlan = scenario.wlan_of(self.id);
        let system = &scenario.system;

        NodeReport {
            node_id: self.id,
            code: config.code.clone(),
            role: config.role,
            wlan: wlan.code.clone(),
            throughput: self
                .stats
                .throughput(system.frame_lengths.payload_bits(), system.simulation_time),
            throughput_per_sta: if self.is_transmitter {
                self.stats
                    .throughput_per_sta(system.frame_lengths.payload_bits(), system.simulation_time)
            } else {
                Vec::new()
            },
            prob_slotted_bo_collision: self.stats.prob_slotted_bo_collision(),
            final_cw: self.cw.current(),
            cw_min: self.cw.min(),
            cw_max: self.cw.max(),
            hidden_nodes: self.hidden.list(),
            unreachable: wlan
                .sta_ids
                .iter()
                .zip(&self.unreachable)
                .filter_map(|(sta, unreachable)| unreachable.then_some(*sta))
                .collect(),
            stats: self.stats.clone(),
        }
    }

    pub fn start(&mut self, mut ctx: Context) {
        let ctx = &mut ctx;

        self.mcs_stale.fill(true);
        if !self.is_transmitter {
            return;
        }

        self.buffer = ctx.config().traffic.initial_buffer();
        self.draw_backoff(ctx);
        self.schedule_arrival(ctx);

        let difs = ctx.system().difs;
        self.resume_if_allowed(ctx, difs);
    }

    pub fn on_timer(&mut self, mut ctx: Context, purpose: TimerPurpose) {
        let ctx = &mut ctx;

        match purpose {
            TimerPurpose::EndBackoff => self.end_backoff(ctx),
            TimerPurpose::ResumeBackoff => self.resume_backoff(ctx),
            TimerPurpose::TxFinished => self.tx_finished(ctx),
            TimerPurpose::SendResponse => self.send_response(ctx),
            TimerPurpose::StartTransmission => self.start_transmission(ctx),
            TimerPurpose::CtsTimeout => self.cts_timeout(ctx),
            TimerPurpose::DataTimeout => self.data_timeout(ctx),
            TimerPurpose::AckTimeout => self.ack_timeout(ctx),
            TimerPurpose::NavTimeout => self.nav_timeout(ctx),
            TimerPurpose::NewPacket => self.new_packet(ctx),
            TimerPurpose::WaitCollisions => self.wait_collisions(ctx),
            TimerPurpose::RestartSta => self.restart(ctx),
        }
    }

    fn set_state(&mut self, now: Time, state: NodeState) {
        if self.state == NodeState::Nav && state != NodeState::Nav {
            if let Some(since) = self.nav_since.take() {
                self.stats.time_in_nav = self.stats.time_in_nav + (now - since);
            }
        } else if self.state != NodeState::Nav && state == NodeState::Nav {
            self.nav_since = Some(now);
        }

        self.state = state;
    }

    fn primary(&self, ctx: &Context) -> Channel {
        ctx.config().primary_channel
    }

    fn primary_busy(&self, ctx: &Context) -> bool {
        self.view.is_busy(self.primary(ctx), self.sensitivity)
    }

    fn resume_allowed(&self, ctx: &Context) -> bool {
        !self.primary_busy(ctx) && self.buffer > 0
    }

    fn draw_backoff(&mut self, ctx: &mut Context) {
        let system = ctx.system();
        self.remaining_backoff = backoff::draw_backoff(
            system.backoff_distribution,
            system.backoff_type,
            self.cw.current(),
            ctx.rng(),
        );
    }

    /// Freezes the countdown, either before it resumed or while it was running.
    fn pause_backoff(&mut self, ctx: &mut Context) {
        if ctx.is_armed(TimerPurpose::ResumeBackoff) {
            ctx.cancel(TimerPurpose::ResumeBackoff);
        } else if let Some(at) = ctx.armed_at(TimerPurpose::EndBackoff) {
            self.remaining_backoff = remaining_backoff(ctx.system().backoff_type, at - ctx.now());
            ctx.cancel(TimerPurpose::EndBackoff);
        }
    }

    fn pause_if_allowed(&mut self, ctx: &mut Context) {
        if self.is_transmitter && self.primary_busy(ctx) {
            self.pause_backoff(ctx);
        }
    }

    /// Restarts the countdown after `delay` if the primary is idle and there is something to send.
    fn resume_if_allowed(&mut self, ctx: &mut Context, delay: Time) {
        if self.is_transmitter
            && !ctx.is_armed(TimerPurpose::EndBackoff)
            && self.resume_allowed(ctx)
        {
            ctx.arm_in(TimerPurpose::ResumeBackoff, delay);
        }
    }

    fn schedule_arrival(&mut self, ctx: &mut Context) {
        let traffic = ctx.config().traffic;
        if let Some(gap) = traffic.next_arrival(ctx.rng()) {
            ctx.arm_in(TimerPurpose::NewPacket, gap);
        }
    }

    /// Reception of `frame` as things stand on the channel right now.
    fn evaluate(&self, ctx: &Context, frame: &Notification) -> (LossReason, f64) {
        let system = ctx.system();
        let power = self.power_from[frame.source];
        let interference = self.view.max_interference(frame.range, frame.source);
        let sinr = sinr(power, system.noise_level.as_linear(), interference);

        let reception = Reception {
            primary: self.primary(ctx),
            range: frame.range,
            power,
            sinr,
            sensitivity: self.sensitivity,
            capture_effect: system.capture_effect,
        };

        (classify(&reception), sinr)
    }

    /// [`Self::evaluate`] with the constant packet error rate applied to frames that would survive.
    fn evaluate_with_per(&self, ctx: &mut Context, frame: &Notification) -> (LossReason, f64) {
        let (reason, sinr) = self.evaluate(ctx, frame);
        let per = ctx.system().constant_per;

        if reason == LossReason::NotLost && per > 0.0 && per_hit(per, ctx.rng().random()) {
            (LossReason::LostInterference, sinr)
        } else {
            (reason, sinr)
        }
    }

    fn cannot_sense(&self, node_id: usize) -> bool {
        Db::from(self.power_from[node_id]) < self.sensitivity
    }

    fn send_nack(
        &mut self,
        ctx: &mut Context,
        frame: &Notification,
        node_a: usize,
        node_b: Option<usize>,
        reason: LossReason,
        sinr: f64,
    ) {
        self.stats.nacks_sent += 1;
        ctx.send_nack(LogicalNack {
            packet_type: frame.packet_type,
            packet_id: frame.packet_id,
            source: self.id,
            node_a,
            node_b,
            reason,
            sinr,
            per: ctx.system().constant_per,
        });
    }

    /// A frame from this node with the parameters of the current exchange.
    fn notification(
        &self,
        ctx: &Context,
        packet_type: PacketType,
        destination: usize,
        tx_duration: Time,
        nav_time: Time,
    ) -> Notification {
        let config = ctx.config();
        let lengths = &ctx.system().frame_lengths;

        let packet_length = match packet_type {
            PacketType::Rts => lengths.rts,
            PacketType::Cts => lengths.cts,
            PacketType::Data => lengths.payload_bits(),
            PacketType::Ack => lengths.ack,
            PacketType::McsRequest | PacketType::McsResponse => 0.0,
        };

        Notification {
            packet_type,
            source: self.id,
            destination,
            range: self.range,
            packet_id: self.packet_id,
            tx_duration,
            durations: self.durations,
            nav_time,
            tx_power: self.tx_power - Dbf::from_unit(self.range.width() as f64),
            tx_gain: config.tx_gain,
            position: config.position,
            timestamp: ctx.now(),
            packet_length,
            data_rate: self.data_rate,
            mcs_response: None,
        }
    }

    fn transmit(&mut self, ctx: &mut Context, frame: Notification) {
        self.stats.record_tx(frame.range, frame.tx_duration);
        self.on_air = Some(frame.clone());
        ctx.start_tx(frame);
    }

    fn finish_transmission(&mut self, ctx: &mut Context) {
        if let Some(frame) = self.on_air.take() {
            ctx.finish_tx(frame);
        }
    }

    fn enter_nav(&mut self, ctx: &mut Context, reservation: &Notification) {
        self.nav_notification = Some(reservation.clone());
        ctx.arm_in(
            TimerPurpose::NavTimeout,
            reservation.nav_time - TIME_OUT_EXTRA_TIME,
        );
        self.set_state(ctx.now(), NodeState::Nav);
    }

    /// Takes in `frame` as the frame being received and moves to `state`.
    fn accept(&mut self, ctx: &mut Context, frame: &Notification, state: NodeState) {
        self.durations = frame.durations;
        self.range = frame.range;
        self.data_rate = frame.data_rate;
        self.incoming = Some(frame.clone());
        self.set_state(ctx.now(), state);
    }

    fn reset_exchange(&mut self) {
        self.destination = None;
        self.current_tx_duration = Time::ZERO;
        self.nav_time = Time::ZERO;
        self.pending = None;
        self.incoming = None;
        self.nav_notification = None;
        self.in_flight_since = None;
    }

    /// Counters towards `destination` if it is one of this node's stations.
    fn sta_counters(&mut self, ctx: &Context, destination: usize) -> Option<&mut StaCounters> {
        let index = ctx.wlan().sta_index(destination)?;
        self.stats.per_sta.get_mut(index)
    }

    /// Back to sensing with a fresh backoff, dropping whatever exchange was going on.
    fn restart(&mut self, ctx: &mut Context) {
        self.reset_exchange();
        self.set_state(ctx.now(), NodeState::Sensing);

        if self.is_transmitter {
            self.packet_id += 1;
            ctx.cancel(TimerPurpose::EndBackoff);
            self.draw_backoff(ctx);

            if self.resume_allowed(ctx) {
                let difs = ctx.system().difs;
                ctx.arm_in(TimerPurpose::ResumeBackoff, difs);
            } else {
                ctx.cancel(TimerPurpose::ResumeBackoff);
            }
        }

        for purpose in [
            TimerPurpose::AckTimeout,
            TimerPurpose::CtsTimeout,
            TimerPurpose::DataTimeout,
            TimerPurpose::NavTimeout,
            TimerPurpose::WaitCollisions,
            TimerPurpose::RestartSta,
        ] {
            ctx.cancel(purpose);
        }

        ctx.log(
            || format!("Restarted with backoff {} µs", self.remaining_backoff.micros()),
            LogLevel::Trace,
        );
    }
}
