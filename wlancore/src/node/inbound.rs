//! Reactions to other nodes: frames starting and finishing, and logical NACKs.

use crate::{
    classifier::{as_pure_collision, promote_if_simultaneous},
    notification::{LogicalNack, LossReason, Notification, PacketType},
    scheduler::TimerPurpose,
    simulation::{
        Context,
        data_structs::{LogContent, LogLevel},
    },
    timing::{MAX_DIFFERENCE_SAME_TIME, TIME_OUT_EXTRA_TIME, quantize, same_instant},
};

use super::{Node, NodeState};

impl Node {
    pub fn on_tx_start(&mut self, mut ctx: Context, frame: &Notification) {
        let ctx = &mut ctx;
        let system = ctx.system();

        let in_range = ctx.received_power(frame);
        self.power_from[frame.source] = in_range;
        self.view.add_transmitter(
            frame.source,
            system
                .propagation
                .spread(in_range, frame.range, system.num_channels),
        );
        self.view.update_free_since(self.sensitivity, ctx.now());

        let to_me = frame.destination == self.id;

        match self.state {
            NodeState::Sensing if to_me && frame.packet_type == PacketType::Rts => {
                self.rts_while_sensing(ctx, frame)
            }
            NodeState::Sensing => self.overheard_while_sensing(ctx, frame),
            NodeState::Nav if to_me => self.addressed_in_nav(ctx, frame),
            NodeState::Nav if frame.is_reservation() => self.reservation_in_nav(ctx, frame),
            NodeState::Nav => {}
            NodeState::TxRts | NodeState::TxCts | NodeState::TxData | NodeState::TxAck => {
                if to_me {
                    let (_, sinr) = self.evaluate(ctx, frame);
                    self.send_nack(
                        ctx,
                        frame,
                        frame.source,
                        None,
                        LossReason::LostDestinationTx,
                        sinr,
                    );
                }
            }
            NodeState::RxRts | NodeState::RxCts | NodeState::RxData | NodeState::RxAck => {
                if to_me {
                    self.second_frame_for_me(ctx, frame);
                } else {
                    self.interference_while_receiving(ctx, frame);
                }
            }
            NodeState::WaitCts => self.awaited(ctx, frame, to_me, PacketType::Cts),
            NodeState::WaitData => self.awaited(ctx, frame, to_me, PacketType::Data),
            NodeState::WaitAck => self.awaited(ctx, frame, to_me, PacketType::Ack),
            NodeState::Sleep => {}
        }
    }

    fn rts_while_sensing(&mut self, ctx: &mut Context, frame: &Notification) {
        let (reason, sinr) = self.evaluate_with_per(ctx, frame);

        if reason.is_lost() {
            let reason = match self.outrange_nav {
                Some(timestamp) => promote_if_simultaneous(reason, timestamp, frame.timestamp),
                None => reason,
            };

            self.send_nack(ctx, frame, frame.source, None, reason, sinr);
            self.pause_if_allowed(ctx);
        } else {
            self.accept(ctx, frame, NodeState::RxRts);
            if self.is_transmitter {
                self.pause_backoff(ctx);
            }
        }
    }

    fn overheard_while_sensing(&mut self, ctx: &mut Context, frame: &Notification) {
        if frame.is_reservation() {
            let (reason, _) = self.evaluate(ctx, frame);

            if reason.is_lost() {
                self.outrange_nav = Some(frame.timestamp);
                self.pause_if_allowed(ctx);
            } else {
                if self.is_transmitter {
                    self.pause_backoff(ctx);
                }
                self.enter_nav(ctx, frame);
                ctx.log(
                    || {
                        format!(
                            "NAV for {} µs on {} from node {}",
                            frame.nav_time.micros(),
                            frame.packet_type,
                            frame.source
                        )
                    },
                    LogLevel::Trace,
                );
            }
        } else {
            self.pause_if_allowed(ctx);
        }
    }

    fn addressed_in_nav(&mut self, ctx: &mut Context, frame: &Notification) {
        let nav_source = self
            .nav_notification
            .as_ref()
            .filter(|x| same_instant(x.timestamp, frame.timestamp))
            .map(|x| x.source);

        match nav_source {
            Some(nav_source) if frame.packet_type == PacketType::Rts => {
                let (reason, sinr) = self.evaluate_with_per(ctx, frame);

                if reason.is_lost() {
                    if !self.is_transmitter {
                        ctx.cancel(TimerPurpose::NavTimeout);
                        self.set_state(ctx.now(), NodeState::Sleep);
                        ctx.arm_in(TimerPurpose::RestartSta, MAX_DIFFERENCE_SAME_TIME);
                    }
                    self.send_nack(
                        ctx,
                        frame,
                        frame.source,
                        Some(nav_source),
                        LossReason::LostBoCollision,
                        sinr,
                    );
                } else {
                    ctx.cancel(TimerPurpose::NavTimeout);
                    self.nav_notification = None;
                    self.accept(ctx, frame, NodeState::RxRts);
                    if self.is_transmitter {
                        self.pause_backoff(ctx);
                    }
                }
            }
            _ => {
                let (_, sinr) = self.evaluate(ctx, frame);
                self.send_nack(
                    ctx,
                    frame,
                    frame.source,
                    None,
                    LossReason::LostRxInNav,
                    sinr,
                );
            }
        }
    }

    fn reservation_in_nav(&mut self, ctx: &mut Context, frame: &Notification) {
        let system = ctx.system();
        let simultaneous = self
            .nav_notification
            .as_ref()
            .is_some_and(|x| same_instant(x.timestamp, frame.timestamp));

        if simultaneous {
            // Two reservations in the same slot collided, neither exchange will go ahead.
            if self.is_transmitter {
                ctx.cancel(TimerPurpose::NavTimeout);
                ctx.arm_in(
                    TimerPurpose::WaitCollisions,
                    MAX_DIFFERENCE_SAME_TIME + system.sifs + frame.durations.cts + system.difs,
                );
            } else {
                ctx.arm_in(TimerPurpose::NavTimeout, MAX_DIFFERENCE_SAME_TIME);
            }
            return;
        }

        let (reason, _) = self.evaluate(ctx, frame);
        if reason.is_lost() || !self.primary_busy(ctx) {
            return;
        }

        let new_end = quantize(ctx.now() + frame.nav_time - TIME_OUT_EXTRA_TIME);
        let extends = ctx
            .armed_at(TimerPurpose::NavTimeout)
            .is_none_or(|current| new_end > current);

        if extends {
            self.nav_notification = Some(frame.clone());
            ctx.arm(TimerPurpose::NavTimeout, new_end);
        }
    }

    fn second_frame_for_me(&mut self, ctx: &mut Context, frame: &Notification) {
        let Some(incoming) = self.incoming.clone() else {
            return;
        };

        let (reason, sinr) = self.evaluate(ctx, &incoming);

        match as_pure_collision(reason, incoming.timestamp, frame.timestamp) {
            Some(reason) => {
                self.send_nack(
                    ctx,
                    &incoming,
                    incoming.source,
                    Some(frame.source),
                    reason,
                    sinr,
                );

                if reason == LossReason::LostBoCollision && !self.is_transmitter {
                    self.set_state(ctx.now(), NodeState::Sleep);
                    ctx.arm_in(TimerPurpose::RestartSta, MAX_DIFFERENCE_SAME_TIME);
                } else {
                    self.restart(ctx);
                }
            }
            None => {
                let (_, sinr) = self.evaluate(ctx, frame);
                self.send_nack(
                    ctx,
                    frame,
                    frame.source,
                    Some(incoming.source),
                    LossReason::LostLowSignalAndRx,
                    sinr,
                );
            }
        }
    }

    fn interference_while_receiving(&mut self, ctx: &mut Context, frame: &Notification) {
        let Some(incoming) = self.incoming.clone() else {
            return;
        };

        let (reason, sinr) = self.evaluate(ctx, &incoming);
        if !reason.is_lost() {
            return;
        }

        let reason = if self.state == NodeState::RxRts && frame.packet_type == PacketType::Rts {
            promote_if_simultaneous(reason, incoming.timestamp, frame.timestamp)
        } else {
            reason
        };

        self.send_nack(
            ctx,
            &incoming,
            incoming.source,
            Some(frame.source),
            reason,
            sinr,
        );
        self.restart(ctx);
    }

    /// Waiting for the next frame of our own exchange.
    fn awaited(&mut self, ctx: &mut Context, frame: &Notification, to_me: bool, expected: PacketType) {
        if !to_me || frame.packet_type != expected {
            return;
        }

        let (reason, sinr) = self.evaluate_with_per(ctx, frame);

        if reason.is_lost() {
            self.send_nack(ctx, frame, frame.source, None, reason, sinr);
            return;
        }

        let (timeout, next) = match expected {
            PacketType::Cts => (TimerPurpose::CtsTimeout, NodeState::RxCts),
            PacketType::Data => (TimerPurpose::DataTimeout, NodeState::RxData),
            _ => (TimerPurpose::AckTimeout, NodeState::RxAck),
        };

        ctx.cancel(timeout);
        self.accept(ctx, frame, next);
    }

    pub fn on_tx_finish(&mut self, mut ctx: Context, frame: &Notification) {
        let ctx = &mut ctx;
        let system = ctx.system();

        self.view.remove_transmitter(frame.source);
        self.view.update_free_since(self.sensitivity, ctx.now());

        let expected = frame.destination == self.id
            && self
                .incoming
                .as_ref()
                .is_some_and(|x| x.source == frame.source && x.packet_type == frame.packet_type);

        match self.state {
            NodeState::Sensing => self.resume_if_allowed(ctx, system.difs),
            NodeState::RxRts if expected => {
                if self.primary_busy(ctx) {
                    if self.is_transmitter {
                        self.restart(ctx);
                    } else {
                        self.set_state(ctx.now(), NodeState::Sleep);
                        ctx.arm_in(TimerPurpose::RestartSta, MAX_DIFFERENCE_SAME_TIME);
                    }
                    return;
                }

                let d = self.durations;
                self.destination = Some(frame.source);
                self.current_tx_duration = d.cts;
                self.nav_time = quantize(d.cts + d.data + d.ack + system.sifs * 2.0);
                self.set_state(ctx.now(), NodeState::TxCts);
                ctx.arm_in(TimerPurpose::SendResponse, system.sifs);
            }
            NodeState::RxCts if expected => {
                self.destination = Some(frame.source);
                self.current_tx_duration = self.durations.data;
                self.set_state(ctx.now(), NodeState::TxData);
                ctx.arm_in(TimerPurpose::SendResponse, system.sifs);
            }
            NodeState::RxData if expected => {
                self.destination = Some(frame.source);
                self.current_tx_duration = self.durations.ack;
                self.set_state(ctx.now(), NodeState::TxAck);
                ctx.arm_in(TimerPurpose::SendResponse, system.sifs);
            }
            NodeState::RxAck if expected => {
                self.stats.data_packets_acked += 1;
                if let Some(counters) = self.sta_counters(ctx, frame.source) {
                    counters.data_packets_acked += 1;
                }
                if let Some(arrival) = self.in_flight_since.take() {
                    self.stats.record_delay(ctx.now() - arrival);
                }
                self.cw.reset(system.cw_adaptation);
                self.restart(ctx);
            }
            _ => {}
        }
    }

    pub fn on_nack(&mut self, mut ctx: Context, nack: &LogicalNack) {
        let ctx = &mut ctx;

        if !nack.implicates(self.id) {
            return;
        }

        self.stats.nacks_received[nack.reason.index()] += 1;

        match nack.reason {
            LossReason::LostBoCollision => self.stats.rts_lost_slotted_bo += 1,
            LossReason::LostPureCollision | LossReason::LostInterference => {
                self.detect_hidden(ctx, nack)
            }
            _ => {}
        }
    }

    fn detect_hidden(&mut self, ctx: &mut Context, nack: &LogicalNack) {
        let newly_hidden: Vec<usize> = match nack.other_than(self.id) {
            Some(other) => {
                if self.cannot_sense(other) && !self.hidden.is_hidden(other) {
                    self.hidden.mark(other);
                    vec![other]
                } else {
                    Vec::new()
                }
            }
            None => {
                let candidates: Vec<usize> = (0..self.power_from.len())
                    .filter(|x| *x != self.id && self.view.is_transmitting(*x) && self.cannot_sense(*x))
                    .collect();

                candidates
                    .into_iter()
                    .filter(|x| self.hidden.suspect(*x))
                    .collect()
            }
        };

        for hidden_id in newly_hidden {
            ctx.log_content(
                LogContent::HiddenNodeDetected {
                    node_id: self.id,
                    hidden_id,
                },
                LogLevel::Info,
            );
        }
    }
}
