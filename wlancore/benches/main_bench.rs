use criterion::{Criterion, criterion_group, criterion_main};
use std::{hint::black_box, time::Duration};
use wlancore::{
    channel::{ChannelRange, bonding::ChannelBondingPolicy},
    position::Position,
    scenario::{NodeConfig, Scenario, SystemConfig},
    simulation::run_simulation,
    units::Time,
};

/// Four overlapping WLANs on an eight channel band, two stations each.
fn dense_scenario() -> Scenario {
    let system = SystemConfig {
        simulation_time: Time::from_seconds(1.0),
        ..SystemConfig::default()
    };

    let mut scenario = Scenario::new("bench", system);

    for wlan in 0..4 {
        let x = wlan as f64 * 8.0;
        let primary = wlan * 2;

        let ap = NodeConfig::ap(format!("AP_{wlan}"), Position::new(x, 0.0, 0.0))
            .with_channels(primary, ChannelRange::new(0, 7))
            .with_bonding(ChannelBondingPolicy::AlwaysMax);
        let stations = (0..2).map(|n| {
            NodeConfig::sta(
                format!("STA_{wlan}_{n}"),
                Position::new(x, 2.0 + n as f64, 0.0),
            )
            .with_channels(primary, ChannelRange::new(0, 7))
        });

        scenario.add_wlan(format!("W{wlan}"), ap, stations);
    }

    scenario
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let this = dense_scenario();

    let mut group = c.benchmark_group("main");
    group.measurement_time(Duration::from_secs(15));

    group.bench_function("Full Simulation", |b| {
        b.iter(|| {
            black_box(run_simulation(123456, this.clone(), false));
        })
    });

    group.bench_function("Full Simulation with Logs", |b| {
        b.iter(|| {
            black_box(run_simulation(123456, this.clone(), true));
        })
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
