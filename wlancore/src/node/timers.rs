use rand::Rng;

use crate::{
    mcs::{FrameDurations, NUM_WIDTHS},
    notification::PacketType,
    scheduler::TimerPurpose,
    simulation::{
        Context,
        data_structs::{LogContent, LogLevel},
    },
    timing::{MAX_NUM_RAND_TIME, TIME_OUT_EXTRA_TIME, preoccupancy_delay, quantize},
    units::{Dbf, Time},
};

use super::{
    Node, NodeState,
    backoff::{BackoffType, remaining_backoff},
    traffic::PACKET_BUFFER_SIZE,
};

const POWER_STEP: Dbf = Dbf::from_db_value(1.0);

impl Node {
    pub(super) fn end_backoff(&mut self, ctx: &mut Context) {
        if self.state != NodeState::Sensing {
            return;
        }

        ctx.cancel(TimerPurpose::NavTimeout);

        self.negotiate_mcs(ctx);
        self.stats.tx_init_tried += 1;

        let config = ctx.config();
        let system = ctx.system();

        let selected = self.select_destination(ctx).and_then(|sta_index| {
            let free = self.view.free_channels(
                config.allowed,
                config.primary_channel,
                self.sensitivity,
                ctx.now(),
                system.pifs_activated.then_some(system.pifs),
            );
            let mcs = self.mcs[sta_index];
            config
                .channel_bonding
                .select(&free, config.allowed, config.primary_channel, &mcs, ctx.rng())
                .and_then(|range| {
                    mcs[range.width_index()].map(|modulation| (sta_index, range, modulation))
                })
        });

        let Some((sta_index, range, modulation)) = selected else {
            self.stats.tx_init_not_possible += 1;
            self.draw_backoff(ctx);
            self.set_state(ctx.now(), NodeState::Sensing);
            self.resume_if_allowed(ctx, system.difs);
            ctx.log(|| "No channel range available".to_owned(), LogLevel::Trace);
            return;
        };

        let destination = ctx.wlan().sta_ids[sta_index];
        let width_index = range.width_index();

        self.set_state(ctx.now(), NodeState::TxRts);
        self.stats.trials_per_width[width_index] += 1;
        self.destination = Some(destination);
        self.range = range;
        self.durations =
            FrameDurations::compute(system.phy_timing, modulation, width_index, &system.frame_lengths);
        self.data_rate = modulation.data_rate(width_index);

        let d = self.durations;
        self.nav_time = quantize(d.rts + d.cts + d.data + d.ack + system.sifs * 3.0);
        self.current_tx_duration = d.rts;

        let mut rts = self.notification(ctx, PacketType::Rts, destination, d.rts, self.nav_time);

        let start_delay = match system.backoff_type {
            BackoffType::Slotted => {
                // Frames of nodes whose backoff ends in the same slot must still start in a fixed order.
                let draw = ctx.rng().random_range(2..MAX_NUM_RAND_TIME);
                let delay = preoccupancy_delay(draw);
                rts.nav_time = rts.nav_time - delay;
                self.pending = Some(rts);
                ctx.arm_in(TimerPurpose::StartTransmission, delay);
                delay
            }
            BackoffType::Continuous => {
                self.transmit(ctx, rts);
                Time::ZERO
            }
        };

        ctx.arm_in(TimerPurpose::TxFinished, start_delay + d.rts);
        self.stats.rts_cts_sent += 1;
        if let Some(counters) = self.sta_counters(ctx, destination) {
            counters.rts_cts_sent += 1;
        }
        ctx.cancel(TimerPurpose::ResumeBackoff);

        ctx.log(
            || format!("RTS to node {} on {}", destination, range),
            LogLevel::Trace,
        );
    }

    /// Refreshes the MCS table of every station that needs it, raising the transmit power
    /// one step at a time while even a single channel gives nothing.
    fn negotiate_mcs(&mut self, ctx: &mut Context) {
        let config = ctx.config();

        if let Some(modulation) = config.default_modulation {
            self.mcs.fill([Some(modulation); NUM_WIDTHS]);
            self.mcs_stale.fill(false);
            return;
        }

        let stations = &ctx.wlan().sta_ids;
        for (sta_index, &sta) in stations.iter().enumerate() {
            if !self.mcs_stale[sta_index] || self.unreachable[sta_index] {
                continue;
            }

            let mut request = self.notification(ctx, PacketType::McsRequest, sta, Time::ZERO, Time::ZERO);
            request.tx_power = self.tx_power;

            let mut table = ctx.request_mcs(&request).mcs_response.unwrap_or_default();
            while table[0].is_none() && self.tx_power < config.tx_power.max {
                let raised = self.tx_power + POWER_STEP;
                self.tx_power = if raised > config.tx_power.max {
                    config.tx_power.max
                } else {
                    raised
                };
                request.tx_power = self.tx_power;
                table = ctx.request_mcs(&request).mcs_response.unwrap_or_default();
            }

            self.stats.mcs_negotiations += 1;
            self.mcs[sta_index] = table;
            self.mcs_stale[sta_index] = false;

            if table[0].is_none() {
                self.unreachable[sta_index] = true;
                ctx.log_content(
                    LogContent::DestinationUnreachable {
                        node_id: self.id,
                        destination_id: sta,
                    },
                    LogLevel::Info,
                );
            } else {
                ctx.log_content(
                    LogContent::McsNegotiated {
                        node_id: self.id,
                        destination_id: sta,
                        mcs: table,
                        tx_power: self.tx_power,
                    },
                    LogLevel::Debug,
                );
            }
        }
    }

    /// Index into the WLAN's stations of the receiver of the next exchange.
    fn select_destination(&self, ctx: &mut Context) -> Option<usize> {
        let wlan = ctx.wlan();

        if let Some(index) = ctx.config().destination.and_then(|x| wlan.sta_index(x)) {
            return (!self.unreachable[index]).then_some(index);
        }

        let reachable: Vec<usize> = (0..wlan.sta_ids.len())
            .filter(|x| !self.unreachable[*x])
            .collect();

        match reachable.len() {
            0 => None,
            1 => Some(reachable[0]),
            n => Some(reachable[ctx.rng().random_range(0..n)]),
        }
    }

    pub(super) fn resume_backoff(&mut self, ctx: &mut Context) {
        if self.state == NodeState::Sensing {
            ctx.arm_in(TimerPurpose::EndBackoff, self.remaining_backoff);
        }
    }

    pub(super) fn start_transmission(&mut self, ctx: &mut Context) {
        if let Some(frame) = self.pending.take() {
            self.transmit(ctx, frame);
        }
    }

    pub(super) fn tx_finished(&mut self, ctx: &mut Context) {
        let system = ctx.system();
        self.finish_transmission(ctx);

        match self.state {
            NodeState::TxRts => {
                ctx.arm_in(
                    TimerPurpose::CtsTimeout,
                    system.sifs + self.durations.cts + system.difs,
                );
                self.set_state(ctx.now(), NodeState::WaitCts);
            }
            NodeState::TxCts => {
                ctx.arm_in(TimerPurpose::DataTimeout, system.sifs + TIME_OUT_EXTRA_TIME);
                self.set_state(ctx.now(), NodeState::WaitData);
            }
            NodeState::TxData => {
                ctx.arm_in(TimerPurpose::AckTimeout, system.sifs + TIME_OUT_EXTRA_TIME);
                self.set_state(ctx.now(), NodeState::WaitAck);
            }
            NodeState::TxAck => self.restart(ctx),
            state => {
                let state = state.to_string();
                ctx.log(
                    || format!("Transmission finished while in {}", state),
                    LogLevel::Error,
                );
            }
        }
    }

    /// Sends the CTS, DATA or ACK prepared when the previous frame of the exchange ended.
    pub(super) fn send_response(&mut self, ctx: &mut Context) {
        let Some(destination) = self.destination else {
            return;
        };

        let (packet_type, nav_time) = match self.state {
            NodeState::TxCts => (PacketType::Cts, self.nav_time),
            NodeState::TxData => (PacketType::Data, Time::ZERO),
            NodeState::TxAck => (PacketType::Ack, Time::ZERO),
            _ => return,
        };

        let frame = self.notification(ctx, packet_type, destination, self.current_tx_duration, nav_time);
        self.transmit(ctx, frame);
        ctx.arm_in(TimerPurpose::TxFinished, self.current_tx_duration);

        if packet_type == PacketType::Data {
            self.stats.data_packets_sent += 1;
            if let Some(counters) = self.sta_counters(ctx, destination) {
                counters.data_packets_sent += 1;
            }
            if ctx.config().traffic.drains() {
                self.buffer = self.buffer.saturating_sub(1);
                self.in_flight_since = self.arrivals.pop_front();
            }
        }
    }

    pub(super) fn cts_timeout(&mut self, ctx: &mut Context) {
        let system = ctx.system();

        self.stats.rts_cts_lost += 1;
        self.stats.record_lost(self.range, self.durations.rts);
        self.cw.increase(system.cw_adaptation);

        if let Some(destination) = self.destination {
            if let Some(counters) = self.sta_counters(ctx, destination) {
                counters.rts_cts_lost += 1;
            }
        }

        ctx.log(
            || format!("No CTS, contention window now {}", self.cw.current()),
            LogLevel::Debug,
        );

        self.restart(ctx);
    }

    pub(super) fn data_timeout(&mut self, ctx: &mut Context) {
        self.stats.rts_cts_lost += 1;
        self.restart(ctx);
    }

    pub(super) fn ack_timeout(&mut self, ctx: &mut Context) {
        self.stats.data_packets_lost += 1;
        if let Some(destination) = self.destination {
            if let Some(counters) = self.sta_counters(ctx, destination) {
                counters.data_packets_lost += 1;
            }
        }
        self.stats.record_lost(self.range, self.durations.data);
        self.cw.increase(ctx.system().cw_adaptation);

        ctx.log(
            || format!("No ACK, contention window now {}", self.cw.current()),
            LogLevel::Debug,
        );

        self.restart(ctx);
    }

    pub(super) fn nav_timeout(&mut self, ctx: &mut Context) {
        if self.state != NodeState::Nav {
            return;
        }

        self.nav_notification = None;

        if self.is_transmitter {
            self.set_state(ctx.now(), NodeState::Sensing);
            let delay = ctx.system().difs - TIME_OUT_EXTRA_TIME;
            self.resume_if_allowed(ctx, delay);
        } else {
            self.restart(ctx);
        }
    }

    pub(super) fn wait_collisions(&mut self, ctx: &mut Context) {
        if self.state != NodeState::Nav {
            return;
        }

        self.set_state(ctx.now(), NodeState::Sensing);
        self.nav_notification = None;
        let difs = ctx.system().difs;
        self.resume_if_allowed(ctx, difs);
    }

    pub(super) fn new_packet(&mut self, ctx: &mut Context) {
        if self.buffer < PACKET_BUFFER_SIZE {
            self.buffer += 1;
            self.stats.packets_generated += 1;
            self.arrivals.push_back(ctx.now());

            if self.state == NodeState::Sensing && self.buffer == 1 {
                if let Some(at) = ctx.armed_at(TimerPurpose::EndBackoff) {
                    self.remaining_backoff =
                        remaining_backoff(ctx.system().backoff_type, at - ctx.now());
                }
                let difs = ctx.system().difs;
                self.resume_if_allowed(ctx, difs);
            }
        } else {
            self.stats.packets_dropped += 1;
        }

        self.schedule_arrival(ctx);
    }
}
