//! The simulator cli.

use std::{
    fs::{create_dir_all, read_dir},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use clap::Parser;
use rand::{Rng, rng};
use rayon::prelude::*;
use wlancore::{
    scenario::Scenario,
    sim_file::{self, SimFileError},
    simulation::run_simulation,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    quiet: bool,

    /// Scenario file or directory containing scenario files
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// File name for output or folder to put simulation results into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for the rng. A random seed will be used if not specified.
    /// With `--runs` the seeds are consecutive starting from this one.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of runs of each scenario, each with its own seed
    #[arg(short, long, default_value_t = 1)]
    runs: u64,

    /// Record node level logs in the output
    #[arg(long)]
    node_logs: bool,

    /// Show timing information
    #[arg(long)]
    time: bool,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let input_path = args.input.clone().unwrap_or("scenario.json".into());
    let use_rmp = !args.json;
    let extension = if use_rmp { "rmp" } else { "json" };

    let mut scenarios = Vec::new();

    if input_path.is_dir() {
        let entries = match read_dir(&input_path) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("<Error> {e}");
                return ExitCode::FAILURE;
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

            match load_scenario(&file.path()) {
                Ok(scenario) => scenarios.push(scenario),
                Err(e) => eprintln!("<Warning> {}: {e}", file.path().display()),
            }
        }
    } else {
        match load_scenario(&input_path) {
            Ok(scenario) => scenarios.push(scenario),
            Err(e) => {
                eprintln!("<Error> {}: {e}", input_path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let sim_count = scenarios.len() as u64 * args.runs;
    let many_outputs = sim_count > 1;

    let output_path = args.output.clone().unwrap_or_else(|| {
        if many_outputs {
            "outputs".into()
        } else {
            format!("sim_output.{extension}").into()
        }
    });

    if many_outputs {
        if let Err(e) = create_dir_all(&output_path) {
            eprintln!("<Error> {e}");
            return ExitCode::FAILURE;
        }
    }

    let base_seed = args.seed.unwrap_or_else(|| rng().random());

    let jobs: Vec<(Scenario, u64)> = scenarios
        .into_iter()
        .flat_map(|scenario| {
            (0..args.runs).map(move |run| (scenario.clone(), base_seed.wrapping_add(run)))
        })
        .collect();

    let timer = args.time.then(Instant::now);
    let count = AtomicU64::new(0);
    let failures = AtomicU64::new(0);

    jobs.into_par_iter().for_each(|(scenario, random_seed)| {
        if !args.quiet {
            println!(
                "<Message> Running simulation for {} with seed {random_seed}",
                scenario.name
            );
        }

        let name = scenario.name.clone();
        let output = run_simulation(random_seed, scenario, args.node_logs);
        count.fetch_add(1, Ordering::Relaxed);

        let out = if many_outputs {
            output_path.join(format!("output_{name}_{random_seed}.{extension}"))
        } else {
            output_path.clone()
        };

        if !args.quiet {
            println!("<Message> Writing output to {out:?}");
        }

        if let Err(e) = sim_file::write_file(&out, &output, use_rmp) {
            eprintln!("<Error> {e}");
            failures.fetch_add(1, Ordering::Relaxed);
        }
    });

    if let Some(timer) = timer {
        let final_count = count.load(Ordering::Relaxed);
        let final_time = timer.elapsed().as_secs_f32();
        println!(
            "Ran {final_count} sims in {:.4}s ({} sims / s)",
            final_time,
            final_count as f32 / final_time
        )
    }

    if failures.load(Ordering::Relaxed) > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error(transparent)]
    File(#[from] SimFileError),
    #[error(transparent)]
    Invalid(#[from] wlancore::scenario::ScenarioError),
}

fn load_scenario(path: &Path) -> Result<Scenario, LoadError> {
    let scenario: Scenario = sim_file::load_file(path)?;
    scenario.validate()?;
    Ok(scenario)
}
