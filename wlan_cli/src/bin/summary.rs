use std::{
    fs::{File, read_dir},
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Serialize;
use wlancore::{
    analysis::RunAnalysis,
    notification::LossReason,
    scenario::NodeRole,
    sim_file::{SimOutput, load_file},
    units::Time,
    verification::verify_all,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long)]
    no_verify: bool,

    /// Results file or directory containing results files
    #[arg(short, long)]
    results: Option<PathBuf>,

    #[arg(short, long)]
    output: Option<PathBuf>,

    /// One row per node instead of one row per run
    #[arg(long)]
    per_node: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let results_path = args.results.unwrap_or("sim_output.rmp".into());
    let simulations = load_result_files(results_path);

    if simulations.is_empty() {
        eprintln!("<Error> No results to summarise");
        return ExitCode::FAILURE;
    }

    let analyses: Vec<RunAnalysis> = simulations
        .into_par_iter()
        .map(RunAnalysis::new)
        .collect();

    let mut verified = true;
    for analysis in analyses.iter() {
        if args.verbose {
            printout(analysis);
        }

        if !args.no_verify && !verify_all(analysis) {
            eprintln!(
                "<Error> Verification failed for {:#?}",
                analysis.complete_identity
            );
            verified = false;
        }
    }

    let written = if args.per_node {
        let table: Vec<NodeEntry> = analyses.iter().flat_map(make_node_entries).collect();
        write_table(args.output, &table)
    } else {
        let table: Vec<RunEntry> = analyses.iter().map(make_run_entry).collect();
        write_table(args.output, &table)
    };

    if let Err(e) = written {
        eprintln!("<Error> {e}");
        return ExitCode::FAILURE;
    }

    if verified {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn write_table<T: Serialize>(maybe_path: Option<PathBuf>, table: &[T]) -> Result<(), csv::Error> {
    let write = if let Some(out_path) = maybe_path {
        let file = File::create(out_path)?;
        Box::new(file) as Box<dyn Write>
    } else {
        Box::new(io::stdout())
    };

    let mut writer = csv::Writer::from_writer(write);
    for entry in table {
        writer.serialize(entry)?;
    }
    writer.flush()?;

    Ok(())
}

fn load_result_files(results_path: PathBuf) -> Vec<SimOutput> {
    let mut sim_results: Vec<SimOutput> = Vec::new();

    if results_path.is_file() {
        match load_file(results_path) {
            Ok(loaded) => sim_results.push(loaded),
            Err(e) => {
                eprintln!("<Error> {e}");
            }
        }
    } else {
        let entries = match read_dir(results_path) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("<Error> {e}");
                return sim_results;
            }
        };

        for thing in entries {
            let file = match thing {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("<Error> {e}");
                    continue;
                }
            };

            match load_file(file.path()) {
                Ok(loaded) => {
                    sim_results.push(loaded);
                }
                Err(e) => {
                    eprintln!("<Warning> {e}");
                    continue;
                }
            };
        }
    }
    sim_results
}

#[derive(Debug, Clone, Serialize)]
struct RunEntry {
    scenario_name: String,
    sim_version: String,
    seed: u64,
    aps: usize,
    /// Mbps
    aggregate_throughput: f64,
    jain_fairness: f64,
    prob_slotted_bo_collision: f64,
    /// ms, empty when nothing was measured
    average_delay: Option<f64>,
    /// Seconds per bonding width, narrowest first
    time_lost_per_width: String,
    total_transmissions: usize,
    total_airtime: f64,
    nacks: u32,
    lost_bo_collision: u32,
    lost_interference: u32,
    lost_pure_collision: u32,
    lost_low_signal: u32,
    lost_rx_in_nav: u32,
    lost_destination_tx: u32,
}

fn make_run_entry(analysis: &RunAnalysis) -> RunEntry {
    let identity = &analysis.complete_identity;
    let losses = &analysis.loss_breakdown;

    RunEntry {
        scenario_name: identity.scenario_name.clone(),
        sim_version: identity.sim_version.clone(),
        seed: identity.simulation_seed,
        aps: analysis
            .reports
            .iter()
            .filter(|x| x.role == NodeRole::Ap)
            .count(),
        aggregate_throughput: analysis.aggregate_throughput / 1e6,
        jain_fairness: analysis.jain_fairness,
        prob_slotted_bo_collision: analysis.prob_slotted_bo_collision,
        average_delay: analysis.average_delay.map(|x| x.milis()),
        time_lost_per_width: join_seconds(&analysis.time_lost_per_width),
        total_transmissions: analysis.transmissions.len(),
        total_airtime: analysis.total_airtime.seconds(),
        nacks: losses.total(),
        lost_bo_collision: losses.count(LossReason::LostBoCollision),
        lost_interference: losses.count(LossReason::LostInterference),
        lost_pure_collision: losses.count(LossReason::LostPureCollision),
        lost_low_signal: losses.count(LossReason::LostLowSignal)
            + losses.count(LossReason::LostLowSignalAndRx),
        lost_rx_in_nav: losses.count(LossReason::LostRxInNav),
        lost_destination_tx: losses.count(LossReason::LostDestinationTx),
    }
}

#[derive(Debug, Clone, Serialize)]
struct NodeEntry {
    scenario_name: String,
    seed: u64,
    node_id: usize,
    code: String,
    wlan: String,
    /// Mbps
    throughput: f64,
    /// Mbps per station of the WLAN
    throughput_per_sta: String,
    prob_slotted_bo_collision: f64,
    final_cw: u32,
    data_packets_sent: u32,
    data_packets_lost: u32,
    data_packets_acked: u32,
    rts_cts_sent: u32,
    rts_cts_lost: u32,
    tx_init_not_possible: u32,
    time_in_nav: f64,
    time_lost_per_width: String,
    /// ms
    average_delay: Option<f64>,
    hidden_nodes: String,
}

fn join_seconds(times: &[Time]) -> String {
    times
        .iter()
        .map(|x| x.seconds().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn make_node_entries(analysis: &RunAnalysis) -> Vec<NodeEntry> {
    let identity = &analysis.complete_identity;

    analysis
        .reports
        .iter()
        .map(|report| NodeEntry {
            scenario_name: identity.scenario_name.clone(),
            seed: identity.simulation_seed,
            node_id: report.node_id,
            code: report.code.clone(),
            wlan: report.wlan.clone(),
            throughput: report.throughput / 1e6,
            throughput_per_sta: report
                .throughput_per_sta
                .iter()
                .map(|x| (x / 1e6).to_string())
                .collect::<Vec<_>>()
                .join(" "),
            prob_slotted_bo_collision: report.prob_slotted_bo_collision,
            final_cw: report.final_cw,
            data_packets_sent: report.stats.data_packets_sent,
            data_packets_lost: report.stats.data_packets_lost,
            data_packets_acked: report.stats.data_packets_acked,
            rts_cts_sent: report.stats.rts_cts_sent,
            rts_cts_lost: report.stats.rts_cts_lost,
            tx_init_not_possible: report.stats.tx_init_not_possible,
            time_in_nav: report.stats.time_in_nav.seconds(),
            time_lost_per_width: join_seconds(&report.stats.time_lost_per_width),
            average_delay: report.stats.average_delay().map(|x| x.milis()),
            hidden_nodes: report
                .hidden_nodes
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect()
}

fn printout(analysis: &RunAnalysis) {
    let identity = &analysis.complete_identity;

    println!();
    println!("{} (seed {})", identity.scenario_name, identity.simulation_seed);
    println!("simulation version: {}", identity.sim_version);
    println!(
        "Aggregate Throughput: {:.3} Mbps  Jain Fairness: {:.4}  BO Collision Probability: {:.4}",
        analysis.aggregate_throughput / 1e6,
        analysis.jain_fairness,
        analysis.prob_slotted_bo_collision
    );
    println!(
        "Total Transmissions: {}  Total Airtime: {:.4}s  NACKs: {}",
        analysis.transmissions.len(),
        analysis.total_airtime.seconds(),
        analysis.loss_breakdown.total(),
    );
    if let Some(delay) = analysis.average_delay {
        println!("Average Delay: {:.3} ms", delay.milis());
    }
    for report in analysis.reports.iter() {
        println!(
            "  {:>8} ({:?}) {:>10.3} Mbps  cw {}",
            report.code,
            report.role,
            report.throughput / 1e6,
            report.final_cw
        );
        for (sta_index, counters) in report.stats.per_sta.iter().enumerate() {
            println!(
                "      sta {}: rts {}/{} lost  data {} sent {} lost {} acked",
                sta_index,
                counters.rts_cts_lost,
                counters.rts_cts_sent,
                counters.data_packets_sent,
                counters.data_packets_lost,
                counters.data_packets_acked
            );
        }
    }
}
