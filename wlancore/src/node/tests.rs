use crate::{
    assert_close,
    channel::ChannelRange,
    mcs::{FrameDurations, Mcs},
    node::backoff::BackoffDistribution,
    notification::{LossReason, Notification, PacketType},
    position::Position,
    scenario::{Bounds, NodeConfig, Scenario, SystemConfig},
    scheduler::TimerPurpose,
    simulation::{
        Simulation,
        data_structs::{BusMessage, LogContent},
    },
    timing::{SLOT_TIME, TIME_OUT_EXTRA_TIME},
    units::{Dbm, Time},
};

use super::NodeState;

fn system() -> SystemConfig {
    SystemConfig {
        num_channels: 1,
        backoff_distribution: BackoffDistribution::Deterministic,
        ..SystemConfig::default()
    }
}

fn ap(code: &str, x: f64) -> NodeConfig {
    NodeConfig::ap(code, Position::new(x, 0.0, 0.0)).with_channels(0, ChannelRange::new(0, 0))
}

fn sta(code: &str, x: f64) -> NodeConfig {
    NodeConfig::sta(code, Position::new(x, 0.0, 0.0)).with_channels(0, ChannelRange::new(0, 0))
}

/// AP_A (0) at 0 m serving STA_A (1) at 5 m, AP_B (2) at 10 m serving STA_B (3) at 15 m.
fn two_wlans() -> Scenario {
    let mut scenario = Scenario::new("two wlans", system());
    scenario.add_wlan("A", ap("AP_A", 0.0), [sta("STA_A", 5.0)]);
    scenario.add_wlan("B", ap("AP_B", 10.0), [sta("STA_B", 15.0)]);
    scenario
}

/// A frame from `source` as it would look at MCS 12 on its primary channel, stamped now.
fn frame(sim: &Simulation, packet_type: PacketType, source: usize, destination: usize) -> Notification {
    let system = &sim.scenario().system;
    let config = &sim.scenario().nodes[source];
    let mcs = Mcs::new(12).expect("valid index");
    let d = FrameDurations::compute(system.phy_timing, mcs, 0, &system.frame_lengths);

    let (tx_duration, nav_time) = match packet_type {
        PacketType::Rts => (d.rts, d.cts + d.data + d.ack + system.sifs * 3.0),
        PacketType::Cts => (d.cts, d.data + d.ack + system.sifs * 2.0),
        PacketType::Data => (d.data, Time::ZERO),
        _ => (d.ack, Time::ZERO),
    };

    Notification {
        packet_type,
        source,
        destination,
        range: ChannelRange::single(config.primary_channel),
        packet_id: 0,
        tx_duration,
        durations: d,
        nav_time,
        tx_power: config.tx_power.default,
        tx_gain: config.tx_gain,
        position: config.position,
        timestamp: sim.now(),
        packet_length: system.frame_lengths.rts,
        data_rate: mcs.data_rate(0),
        mcs_response: None,
    }
}

fn total_nacks(sim: &Simulation, node_id: usize) -> u32 {
    sim.node(node_id).stats.nacks_received.iter().sum()
}

#[test]
fn nav_expiry_depends_on_role() {
    let mut sim = Simulation::new(1, two_wlans(), true);
    let rts = frame(&sim, PacketType::Rts, 2, 3);

    sim.inject(BusMessage::TxStart(rts.clone()));
    assert_eq!(sim.node(0).state(), NodeState::Nav);
    assert_eq!(sim.node(1).state(), NodeState::Nav);
    assert_eq!(sim.node(3).state(), NodeState::RxRts);
    assert_eq!(sim.armed_at(0, TimerPurpose::ResumeBackoff), None);

    sim.jump_to(Time::from_micros(100.0));
    sim.inject(BusMessage::TxFinish(rts));

    sim.fire(0, TimerPurpose::NavTimeout);
    let ap = sim.node(0);
    assert_eq!(ap.state(), NodeState::Sensing);
    assert_eq!(ap.packet_id, 0);
    assert_close(ap.remaining_backoff(), SLOT_TIME * 7.0);
    assert_close(ap.stats.time_in_nav, Time::from_micros(100.0));
    let resume = sim
        .armed_at(0, TimerPurpose::ResumeBackoff)
        .expect("resumes after the reservation");
    assert_close(
        resume,
        Time::from_micros(100.0) + sim.scenario().system.difs - TIME_OUT_EXTRA_TIME,
    );

    sim.fire(1, TimerPurpose::NavTimeout);
    let station = sim.node(1);
    assert_eq!(station.state(), NodeState::Sensing);
    assert_eq!(station.remaining_backoff(), Time::ZERO);
    assert!(station.nav_notification.is_none());
    assert_close(station.stats.time_in_nav, Time::from_micros(100.0));
    assert_eq!(sim.armed_at(1, TimerPurpose::ResumeBackoff), None);
}

#[test]
fn rts_for_deferring_station_is_lost_in_nav() {
    let mut sim = Simulation::new(1, two_wlans(), true);

    let cts = frame(&sim, PacketType::Cts, 3, 2);
    sim.inject(BusMessage::TxStart(cts));
    assert_eq!(sim.node(1).state(), NodeState::Nav);

    sim.jump_to(Time::from_micros(10.0));
    let rts = frame(&sim, PacketType::Rts, 0, 1);
    sim.inject(BusMessage::TxStart(rts));

    assert_eq!(sim.node(1).state(), NodeState::Nav);
    assert_eq!(sim.node(1).stats.nacks_sent, 1);
    assert_eq!(sim.node(0).stats.nacks(LossReason::LostRxInNav), 1);
    assert_eq!(total_nacks(&sim, 0), 1);
    assert_eq!(sim.node(2).stats.nacks_sent, 0);
    assert_eq!(sim.node(3).stats.nacks_sent, 0);
}

#[test]
fn rts_to_transmitting_node() {
    let mut sim = Simulation::new(1, two_wlans(), true);

    sim.fire(0, TimerPurpose::EndBackoff);
    let ap = sim.node(0);
    assert_eq!(ap.state(), NodeState::TxRts);
    assert_eq!(ap.stats.tx_init_tried, 1);
    assert_eq!(ap.stats.rts_cts_sent, 1);
    assert_eq!(ap.stats.per_sta[0].rts_cts_sent, 1);
    assert_eq!(ap.stats.trials_per_width, [1, 0, 0, 0]);

    let rts = frame(&sim, PacketType::Rts, 2, 0);
    sim.inject(BusMessage::TxStart(rts));

    assert_eq!(sim.node(0).state(), NodeState::TxRts);
    assert_eq!(sim.node(0).stats.nacks_sent, 1);
    assert_eq!(sim.node(2).stats.nacks(LossReason::LostDestinationTx), 1);
    assert_eq!(total_nacks(&sim, 2), 1);
}

#[test]
fn second_rts_destroys_the_first() {
    let mut sim = Simulation::new(1, two_wlans(), true);

    sim.inject(BusMessage::TxStart(frame(&sim, PacketType::Rts, 0, 1)));
    assert_eq!(sim.node(1).state(), NodeState::RxRts);

    sim.jump_to(Time::from_micros(0.5));
    sim.inject(BusMessage::TxStart(frame(&sim, PacketType::Rts, 2, 1)));

    assert_eq!(sim.node(1).state(), NodeState::Sensing);
    assert_eq!(sim.node(1).stats.nacks_sent, 1);
    for ap in [0, 2] {
        assert_eq!(sim.node(ap).stats.nacks(LossReason::LostPureCollision), 1);
        assert_eq!(total_nacks(&sim, ap), 1);
        assert!(sim.node(ap).hidden_nodes().is_empty());
    }

    let reported = sim.logs.iter().any(|x| {
        x.content
            == LogContent::NackSent {
                sender_id: 1,
                packet_type: PacketType::Rts,
                packet_id: 0,
                node_a: 0,
                node_b: Some(2),
                reason: LossReason::LostPureCollision,
            }
    });
    assert!(reported);
}

#[test]
fn weak_second_rts_is_dropped() {
    let mut scenario = two_wlans();
    scenario.nodes[3].tx_power = Bounds::fixed(Dbm::from_dbm(-10.0));
    let mut sim = Simulation::new(1, scenario, true);

    sim.inject(BusMessage::TxStart(frame(&sim, PacketType::Rts, 0, 1)));
    sim.jump_to(Time::from_micros(0.5));
    sim.inject(BusMessage::TxStart(frame(&sim, PacketType::Rts, 3, 1)));

    assert_eq!(sim.node(1).state(), NodeState::RxRts);
    assert_eq!(sim.node(1).stats.nacks_sent, 1);
    for implicated in [0, 3] {
        assert_eq!(
            sim.node(implicated).stats.nacks(LossReason::LostLowSignalAndRx),
            1
        );
        assert_eq!(total_nacks(&sim, implicated), 1);
    }
    assert_eq!(total_nacks(&sim, 2), 0);
}

#[test]
fn negotiation_raises_power_until_decodable() {
    // 86.4 dB of free space loss at 100 m: 5 dBm is the lowest whole level that reaches -82 dBm.
    let mut scenario = Scenario::new("far station", system());
    let mut access_point = ap("AP", 0.0);
    access_point.tx_power = Bounds {
        min: Dbm::from_dbm(1.0),
        default: Dbm::from_dbm(1.0),
        max: Dbm::from_dbm(20.0),
    };
    scenario.add_wlan("A", access_point, [sta("STA", 100.0)]);
    let mut sim = Simulation::new(1, scenario, true);

    sim.fire(0, TimerPurpose::EndBackoff);
    let ap = sim.node(0);

    assert_close(ap.tx_power().dbm(), 5.0);
    assert_eq!(ap.mcs_table(0).map(|x| x[0]), Some(Mcs::new(1)));
    assert_eq!(ap.mcs_table(0).map(|x| x[1]), Some(None));
    assert_eq!(ap.stats.mcs_negotiations, 1);
    assert_eq!(ap.stats.tx_init_not_possible, 0);
    assert_eq!(ap.state(), NodeState::TxRts);
}

#[test]
fn unreachable_station_blocks_transmission() {
    let mut scenario = Scenario::new("too far", system());
    scenario.add_wlan("A", ap("AP", 0.0), [sta("STA", 1000.0)]);
    let mut sim = Simulation::new(1, scenario, true);

    sim.fire(0, TimerPurpose::EndBackoff);
    let ap = sim.node(0);
    assert_eq!(ap.state(), NodeState::Sensing);
    assert_close(ap.tx_power().dbm(), 20.0);
    assert_eq!(ap.stats.tx_init_tried, 1);
    assert_eq!(ap.stats.tx_init_not_possible, 1);
    assert_eq!(ap.stats.rts_cts_sent, 0);
    assert_close(ap.remaining_backoff(), SLOT_TIME * 7.0);
    let resume = sim
        .armed_at(0, TimerPurpose::ResumeBackoff)
        .expect("keeps contending");
    assert_close(resume, sim.scenario().system.difs);

    sim.fire(0, TimerPurpose::EndBackoff);
    let ap = sim.node(0);
    assert_eq!(ap.stats.tx_init_tried, 2);
    assert_eq!(ap.stats.tx_init_not_possible, 2);
    assert_eq!(ap.stats.mcs_negotiations, 1);
    assert_eq!(ap.report(sim.scenario()).unreachable, vec![1]);

    let logged = sim.logs.iter().any(|x| {
        x.content
            == LogContent::DestinationUnreachable {
                node_id: 0,
                destination_id: 1,
            }
    });
    assert!(logged);
}
