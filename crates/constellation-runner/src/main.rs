//! Constellation simulation sweep CLI.
//!
//! Runs every routing strategy for a number of repetitions, each repetition
//! offsetting the base seed by its index, mirroring `original_source/
//! main.py`'s `argparse` surface and its `ProcessPoolExecutor`-based sweep.
//! `--input-dir`/`--output-dir` are additions this crate needs that the
//! reference script hardcodes as relative paths (see DESIGN.md).

use anyhow::Result;
use clap::Parser;
use constellation_runner::strategies::STRATEGY_NAMES;
use constellation_runner::{run_job, Job, RunOptions};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "constellation-sim", about = "Run the satellite-constellation routing simulation sweep")]
struct Args {
    /// Data generation growth factor applied every step.
    #[arg(long, default_value_t = 2.0)]
    growth_factor: f64,

    /// Enable the scheduled GSL failure epoch.
    #[arg(long)]
    gsl_failures: bool,

    /// Enable the scheduled ISL failure epoch.
    #[arg(long)]
    isl_failures: bool,

    /// Enable the scheduled ground-station failure epoch.
    #[arg(long)]
    gs_failures: bool,

    /// Number of simulation steps per repetition.
    #[arg(long, default_value_t = 240)]
    max_time_steps: u64,

    /// Write per-satellite/per-groundstation CSV logs alongside evaluation output.
    #[arg(long)]
    logging: bool,

    /// Base RNG seed; repetition `r` uses `seed + r`.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of repetitions per strategy.
    #[arg(long, default_value_t = 1)]
    repetitions: u64,

    /// Directory holding `step_inputs_*.json`, `groundstation_positions.json`
    /// and `atmospheric_attenuation.json`.
    #[arg(long, default_value = "data")]
    input_dir: PathBuf,

    /// Directory evaluation records and CSV logs are written to.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Run a single `ucb` job synchronously on the calling thread instead of
    /// the full sweep, skipping the worker pool.
    #[arg(long)]
    debug: bool,

    /// Verbose (DEBUG-level) logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("Constellation routing simulation sweep");
    info!("{}", "=".repeat(60));

    let options = RunOptions {
        growth_factor: args.growth_factor,
        gsl_failures: args.gsl_failures,
        isl_failures: args.isl_failures,
        gs_failures: args.gs_failures,
        max_time_steps: args.max_time_steps,
        logging: args.logging,
        seed: args.seed,
        input_dir: args.input_dir.clone(),
        output_dir: args.output_dir.clone(),
    };

    if args.debug {
        info!("debug mode: running a single ucb job on the calling thread");
        let job = Job {
            strategy_name: "ucb".to_string(),
            repetition: 0,
        };
        let outcome = run_job(&job, &options)?;
        info!("completed {} steps for {}", outcome.steps_completed, outcome.strategy_name);
        return Ok(());
    }

    let mut jobs = Vec::new();
    for repetition in 0..args.repetitions {
        for &strategy_name in STRATEGY_NAMES.iter() {
            jobs.push(Job {
                strategy_name: strategy_name.to_string(),
                repetition,
            });
        }
    }
    info!("scheduling {} jobs", jobs.len());

    let pool_size = (4 * STRATEGY_NAMES.len() as u64 * args.repetitions).min(61).max(1) as usize;
    info!("worker pool size: {}", pool_size);

    let (sender, receiver) = mpsc::channel::<Job>();
    for job in jobs {
        sender.send(job).expect("receiver outlives every send");
    }
    drop(sender);
    let receiver = Arc::new(Mutex::new(receiver));

    std::thread::scope(|scope| {
        for worker_id in 0..pool_size {
            let receiver = Arc::clone(&receiver);
            let options = &options;
            scope.spawn(move || loop {
                let job = {
                    let receiver = receiver.lock().expect("worker pool mutex poisoned");
                    receiver.recv()
                };
                let Ok(job) = job else { break };
                match run_job(&job, options) {
                    Ok(outcome) => {
                        info!(
                            worker = worker_id,
                            strategy = %outcome.strategy_name,
                            repetition = outcome.repetition,
                            "job finished after {} steps",
                            outcome.steps_completed
                        );
                    }
                    Err(err) => {
                        error!(worker = worker_id, strategy = %job.strategy_name, repetition = job.repetition, "job failed: {err:#}");
                    }
                }
            });
        }
    });

    info!("{}", "=".repeat(60));
    info!("sweep complete");
    info!("{}", "=".repeat(60));

    Ok(())
}
