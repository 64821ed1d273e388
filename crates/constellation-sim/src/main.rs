//! LEO CDN relay simulator
//!
//! Usage:
//!   leo-sim run    --config sim.json [--worker 0 --workers 4]
//!   leo-sim launch --config sim.json [--workers 4]
//!   leo-sim merge  --config sim.json

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use constellation_sim::animation::{AnimationHandle, LogRenderer};
use constellation_sim::harness::{self, WorkerCommand};
use constellation_sim::{merge, workload, SimConfig, Simulation};
use ground_stations::StationRegistry;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "leo-sim",
    about = "Simulate content delivery over a LEO satellite relay constellation"
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate this worker's share of the steps
    Run {
        #[command(flatten)]
        run: RunArgs,

        /// Worker index
        #[arg(long)]
        worker: Option<usize>,

        /// Total number of workers
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Start one `run` process per worker and wait for all of them
    Launch {
        #[command(flatten)]
        run: RunArgs,

        /// Number of worker processes (default: cores - 1)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Merge per-tick result files into one file per stream
    Merge {
        /// Config file naming the result base
        #[arg(short, long, required_unless_present = "results")]
        config: Option<PathBuf>,

        /// Result base path
        #[arg(short, long)]
        results: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Path to the JSON simulation config
    #[arg(short, long)]
    config: PathBuf,

    /// Total number of steps, overriding the config
    #[arg(long)]
    steps: Option<u64>,

    /// Result base path, overriding the config
    #[arg(short, long)]
    results: Option<PathBuf>,
}

impl RunArgs {
    fn load(&self) -> Result<SimConfig> {
        let mut config = SimConfig::load(&self.config)
            .with_context(|| format!("loading config {:?}", self.config))?;
        if let Some(steps) = self.steps {
            config.run.steps = steps;
        }
        if let Some(results) = &self.results {
            config.run.results = results.clone();
        }
        Ok(config)
    }

    /// Arguments that reproduce these overrides in a child process.
    fn forward(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--config".to_string(),
            self.config.display().to_string(),
        ];
        if let Some(steps) = self.steps {
            args.extend(["--steps".to_string(), steps.to_string()]);
        }
        if let Some(results) = &self.results {
            args.extend(["--results".to_string(), results.display().to_string()]);
        }
        args
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "leo_sim=debug,constellation_sim=debug,constellation_net=debug"
    } else {
        "leo_sim=info,constellation_sim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
        )
        .init();

    match cli.command {
        Command::Run {
            run,
            worker,
            workers,
        } => {
            let mut config = run.load()?;
            if let Some(worker) = worker {
                config.run.worker = worker;
            }
            if let Some(workers) = workers {
                config.run.workers = workers;
            }
            simulate(config)
        }
        Command::Launch { run, workers } => {
            // fail fast on a bad config before spawning anything
            run.load()?;
            let workers = workers.unwrap_or_else(harness::default_workers);
            let command = WorkerCommand {
                program: std::env::current_exe().context("locating leo-sim binary")?,
                args: cli_passthrough(&run, cli.verbose),
            };
            info!("Launching {} workers", workers);

            let runtime = tokio::runtime::Runtime::new()?;
            let outcomes = runtime.block_on(harness::launch(&command, workers))?;
            info!("All {} workers finished", outcomes.len());
            Ok(())
        }
        Command::Merge { config, results } => {
            let base = match (results, config) {
                (Some(results), _) => results,
                (None, Some(config)) => SimConfig::load(&config)?.run.results,
                (None, None) => anyhow::bail!("either --config or --results is required"),
            };
            for report in merge::merge_all(&base)? {
                info!(
                    "{}: {} rows from {} ticks -> {:?}",
                    report.stream.suffix(),
                    report.rows,
                    report.ticks,
                    report.path
                );
            }
            Ok(())
        }
    }
}

fn cli_passthrough(run: &RunArgs, verbose: bool) -> Vec<String> {
    let mut args = run.forward();
    if verbose {
        args.push("--verbose".to_string());
    }
    args
}

fn simulate(config: SimConfig) -> Result<()> {
    info!("{}", "=".repeat(60));
    info!(
        "LEO relay simulation, worker {} of {}",
        config.run.worker, config.run.workers
    );
    info!("{}", "=".repeat(60));

    let stations = StationRegistry::load(&config.run.locations)
        .with_context(|| format!("loading locations {:?}", config.run.locations))?;
    let workload = workload::open(config.run.workload.as_ref(), &stations)
        .with_context(|| format!("loading workload {:?}", config.run.workload))?;

    let animation = if config.animation.enabled {
        Some(AnimationHandle::spawn(
            LogRenderer::default(),
            Duration::from_millis(config.animation.frame_interval_ms),
        )?)
    } else {
        None
    };

    let steps = config.assigned_steps();
    let mut simulation = Simulation::new(config, stations, workload, animation)?;
    let summary = simulation.run(&steps)?;

    info!(
        "Resolved {} of {} requests ({} attachment failures, {} path failures)",
        summary.resolved, summary.requests, summary.attachment_failures, summary.path_failures
    );
    Ok(())
}
