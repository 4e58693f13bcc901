use std::collections::{BTreeMap, VecDeque};

use crate::{
    mcs::select_mcs_response,
    node::{Node, stats::NodeReport},
    notification::{LogicalNack, Notification, PacketType},
    scenario::{NodeConfig, Scenario, SystemConfig, Wlan},
    scheduler::{Scheduler, TimerPurpose},
    sim_file::{OutputIdentity, SimOutput},
    units::{Db, Power, Time},
};

use data_structs::{BusMessage, LogContent, LogItem, LogLevel, LogSource, Transmission};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

pub mod data_structs;

pub fn run_simulation(random_seed: u64, scenario: Scenario, do_node_logs: bool) -> SimOutput {
    let mut sim = Simulation::new(random_seed, scenario, do_node_logs);

    while !sim.finished() {
        sim.step();
    }

    sim.into_output()
}

/// Provides access to the underlying simulation to a node.
/// [Context] is structured such that a node only reaches its own timers, the bus,
/// the shared random source and the static configuration.
pub struct Context<'a> {
    scheduler: &'a mut Scheduler,
    outbox: &'a mut VecDeque<BusMessage>,
    rng: &'a mut ChaCha12Rng,
    logs: &'a mut Vec<LogItem>,
    system: &'a SystemConfig,
    nodes: &'a [NodeConfig],
    wlans: &'a [Wlan],
    node_id: usize,
    do_node_logs: bool,
}

impl<'a> Context<'a> {
    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    pub fn node_id(&self) -> usize {
        self.node_id
    }

    pub fn system(&self) -> &'a SystemConfig {
        self.system
    }

    /// Configuration of the current node.
    pub fn config(&self) -> &'a NodeConfig {
        &self.nodes[self.node_id]
    }

    pub fn node_config(&self, node_id: usize) -> &'a NodeConfig {
        &self.nodes[node_id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The WLAN the current node belongs to.
    pub fn wlan(&self) -> &'a Wlan {
        &self.wlans[self.config().wlan]
    }

    /// Arms a timer of the current node at an absolute time, returns the quantized firing time.
    pub fn arm(&mut self, purpose: TimerPurpose, at: Time) -> Time {
        self.scheduler.arm(self.node_id, purpose, at)
    }

    pub fn arm_in(&mut self, purpose: TimerPurpose, delay: Time) -> Time {
        let at = self.now() + delay;
        self.arm(purpose, at)
    }

    pub fn cancel(&mut self, purpose: TimerPurpose) {
        self.scheduler.cancel(self.node_id, purpose);
    }

    pub fn armed_at(&self, purpose: TimerPurpose) -> Option<Time> {
        self.scheduler.armed_at(self.node_id, purpose)
    }

    pub fn is_armed(&self, purpose: TimerPurpose) -> bool {
        self.scheduler.is_armed(self.node_id, purpose)
    }

    pub fn start_tx(&mut self, notification: Notification) {
        self.outbox.push_back(BusMessage::TxStart(notification));
    }

    pub fn finish_tx(&mut self, notification: Notification) {
        self.outbox.push_back(BusMessage::TxFinish(notification));
    }

    pub fn send_nack(&mut self, nack: LogicalNack) {
        self.outbox.push_back(BusMessage::Nack(nack));
    }

    /// The random source of the run. Every draw must go through here for runs to be reproducible.
    pub fn rng(&mut self) -> &mut ChaCha12Rng {
        self.rng
    }

    /// Power per channel received by the current node from the sender of `notification`,
    /// inside the sender's channel range.
    pub fn received_power(&self, notification: &Notification) -> Power {
        let gains = notification.tx_gain + self.config().rx_gain;
        self.system.propagation.received_power(
            notification.tx_power,
            gains,
            notification.position,
            self.config().position,
        )
    }

    /// Answer of the addressed node to an MCS request of the current node.
    /// The exchange happens out of band: it takes no air time and nobody else hears it.
    pub fn request_mcs(&self, request: &Notification) -> Notification {
        let responder = self.node_config(request.destination);

        let power = self.system.propagation.received_power(
            request.tx_power,
            request.tx_gain + responder.rx_gain,
            request.position,
            responder.position,
        );

        Notification {
            packet_type: PacketType::McsResponse,
            source: request.destination,
            destination: request.source,
            tx_power: responder.tx_power.default,
            tx_gain: responder.tx_gain,
            position: responder.position,
            mcs_response: Some(select_mcs_response(Db::from(power))),
            ..request.clone()
        }
    }

    /// Logs an event in the simulation logs. This event is automatically associated with the current node.
    pub fn log(&mut self, text: impl FnOnce() -> String, level: LogLevel) {
        if self.do_node_logs {
            self.log_content(LogContent::Text(text()), level);
        }
    }

    pub fn log_content(&mut self, content: LogContent, level: LogLevel) {
        if self.do_node_logs {
            self.logs.push(LogItem {
                time: self.scheduler.now(),
                log_level: level,
                source: LogSource::Node(self.node_id),
                content,
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct Simulation {
    scenario: Scenario,
    random_seed: u64,
    nodes: Vec<Node>,
    scheduler: Scheduler,
    outbox: VecDeque<BusMessage>,
    rng: ChaCha12Rng,

    pub logs: Vec<LogItem>,
    pub transmissions: Vec<Transmission>,
    /// Index into `transmissions` of the frame each node has on the air.
    on_air: BTreeMap<usize, usize>,

    // Output Detail
    do_node_logs: bool,
}

/// Used to create a Context object.
/// Pass the simulation and the node id of the node the context is for.
/// `let context = context!(self, node_id);`
#[macro_export]
macro_rules! context {
    ($sim: expr, $node_id: expr) => {{
        Context {
            scheduler: &mut $sim.scheduler,
            outbox: &mut $sim.outbox,
            rng: &mut $sim.rng,
            logs: &mut $sim.logs,
            system: &$sim.scenario.system,
            nodes: &$sim.scenario.nodes,
            wlans: &$sim.scenario.wlans,
            node_id: $node_id,
            do_node_logs: $sim.do_node_logs,
        }
    }};
}

impl Simulation {
    /// Builds the nodes and runs their start handlers. The scenario is assumed to be valid,
    /// see [`Scenario::validate`].
    pub fn new(random_seed: u64, scenario: Scenario, do_node_logs: bool) -> Self {
        let node_count = scenario.nodes.len();

        let nodes = (0..node_count)
            .map(|id| Node::new(id, &scenario))
            .collect();

        let mut sim = Simulation {
            scenario,
            random_seed,
            nodes,
            scheduler: Scheduler::new(node_count),
            outbox: VecDeque::new(),
            rng: ChaCha12Rng::seed_from_u64(random_seed),
            logs: Vec::new(),
            transmissions: Vec::new(),
            on_air: BTreeMap::new(),
            do_node_logs,
        };

        for id in 0..node_count {
            let context = context!(sim, id);
            sim.nodes[id].start(context);
        }
        sim.deliver();
        sim.scheduler.discard_stale();

        sim
    }

    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn node(&self, node_id: usize) -> &Node {
        &self.nodes[node_id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns true once no event is left before the end of the simulated time.
    pub fn finished(&self) -> bool {
        self.scheduler
            .peek_time()
            .is_none_or(|x| x > self.scenario.system.simulation_time)
    }

    /// Fires the next timer and delivers everything it put on the bus.
    /// Returns false if there was nothing left to do.
    pub fn step(&mut self) -> bool {
        if self.finished() {
            return false;
        }

        let Some(fired) = self.scheduler.pop_due() else {
            return false;
        };

        let context = context!(self, fired.node_id);
        self.nodes[fired.node_id].on_timer(context, fired.purpose);
        self.deliver();
        self.scheduler.discard_stale();

        true
    }

    /// Runs every event up to and including `time`.
    pub fn run_until(&mut self, time: Time) {
        while self.scheduler.peek_time().is_some_and(|x| x <= time) {
            if !self.step() {
                break;
            }
        }
        self.scheduler.advance_to(time.min(self.scenario.system.simulation_time));
    }

    // Messages raised while delivering join the same queue, so everything settles at the current instant.
    fn deliver(&mut self) {
        while let Some(message) = self.outbox.pop_front() {
            self.record(&message);

            let source = message.source();
            for id in 0..self.nodes.len() {
                if id == source {
                    continue;
                }

                let context = context!(self, id);
                match &message {
                    BusMessage::TxStart(notification) => {
                        self.nodes[id].on_tx_start(context, notification)
                    }
                    BusMessage::TxFinish(notification) => {
                        self.nodes[id].on_tx_finish(context, notification)
                    }
                    BusMessage::Nack(nack) => self.nodes[id].on_nack(context, nack),
                }
            }
        }
    }

    fn record(&mut self, message: &BusMessage) {
        let now = self.scheduler.now();

        match message {
            BusMessage::TxStart(notification) => {
                let id = self.transmissions.len() as u32;
                self.transmissions.push(Transmission {
                    id,
                    transmitter_id: notification.source,
                    destination_id: notification.destination,
                    packet_type: notification.packet_type,
                    packet_id: notification.packet_id,
                    range: notification.range,
                    start_time: now,
                    end_time: now + notification.tx_duration,
                });
                self.on_air.insert(notification.source, id as usize);

                if self.do_node_logs {
                    self.log_content(
                        LogContent::TransmissionStarted {
                            transmitter_id: notification.source,
                            transmission_id: id,
                            packet_type: notification.packet_type,
                            range: notification.range,
                        },
                        LogLevel::Trace,
                    );
                }
            }
            BusMessage::TxFinish(notification) => {
                if let Some(index) = self.on_air.remove(&notification.source) {
                    self.transmissions[index].end_time = now;
                }
            }
            BusMessage::Nack(nack) => {
                self.log_content(
                    LogContent::NackSent {
                        sender_id: nack.source,
                        packet_type: nack.packet_type,
                        packet_id: nack.packet_id,
                        node_a: nack.node_a,
                        node_b: nack.node_b,
                        reason: nack.reason,
                    },
                    LogLevel::Debug,
                );
            }
        }
    }

    pub fn reports(&self) -> Vec<NodeReport> {
        self.nodes
            .iter()
            .map(|x| x.report(&self.scenario))
            .collect()
    }

    pub fn into_output(self) -> SimOutput {
        SimOutput {
            complete_identity: OutputIdentity {
                scenario_name: self.scenario.name.clone(),
                simulation_seed: self.random_seed,
                sim_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            reports: self.reports(),
            logs: self.logs,
            transmissions: self.transmissions,
        }
    }

    fn log_content(&mut self, content: LogContent, level: LogLevel) {
        self.logs.push(LogItem {
            time: self.scheduler.now(),
            log_level: level,
            source: LogSource::Simulation,
            content,
        });
    }
}

#[cfg(test)]
impl Simulation {
    /// Runs the handler of `purpose` on `node_id` now, armed or not, and delivers what it sent.
    pub(crate) fn fire(&mut self, node_id: usize, purpose: TimerPurpose) {
        self.scheduler.cancel(node_id, purpose);
        let context = context!(self, node_id);
        self.nodes[node_id].on_timer(context, purpose);
        self.deliver();
        self.scheduler.discard_stale();
    }

    /// Puts `message` on the bus as if its source had sent it now.
    pub(crate) fn inject(&mut self, message: BusMessage) {
        self.outbox.push_back(message);
        self.deliver();
        self.scheduler.discard_stale();
    }

    /// Moves the clock without firing anything in between.
    pub(crate) fn jump_to(&mut self, time: Time) {
        self.scheduler.advance_to(time);
    }

    pub(crate) fn armed_at(&self, node_id: usize, purpose: TimerPurpose) -> Option<Time> {
        self.scheduler.armed_at(node_id, purpose)
    }
}
