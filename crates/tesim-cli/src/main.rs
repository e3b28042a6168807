//! Command-line driver for transposable element simulations.

mod export;
mod runner;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tesim_core::{RunConfig, SimulationConfig, DEFAULT_SCALE};
use tesim_world::ReplicateJob;
use tokio::signal;
use tracing::{error, info, warn};

/// Simulates transposable elements moving through a two-stranded genome and
/// counts which element types they land on.
#[derive(Parser, Debug)]
#[command(name = "tesim")]
#[command(author, version, about = "Transposable element grid simulator", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run replicates and export the interaction counts as CSV
    Run(RunArgs),

    /// Print the default configuration as JSON
    Config {
        /// Divide genome size and element counts by this factor
        #[arg(long, default_value_t = DEFAULT_SCALE)]
        scale: u64,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON run configuration; defaults to the scaled fly genome
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of rounds
    #[arg(short, long)]
    rounds: Option<usize>,

    /// Override the number of replicates
    #[arg(short = 'n', long)]
    replicates: Option<usize>,

    /// Master seed for reproducible replicates
    #[arg(short, long)]
    seed: Option<u64>,

    /// Scale factor for the default configuration
    #[arg(long, conflicts_with = "config")]
    scale: Option<u64>,

    /// Replicates executed at the same time
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// CSV output path (stdout when absent)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl RunArgs {
    /// Load the configuration and apply command-line overrides
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RunConfig {
                simulation: SimulationConfig::drosophila(self.scale.unwrap_or(DEFAULT_SCALE)),
                ..RunConfig::default()
            },
        };

        if let Some(rounds) = self.rounds {
            config.simulation.num_rounds = rounds;
        }
        if let Some(replicates) = self.replicates {
            config.replicates = replicates;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent_replicates = max_concurrent;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_telemetry(cli.json_logs)?;

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Config { scale } => {
            let config = RunConfig {
                simulation: SimulationConfig::drosophila(scale),
                ..RunConfig::default()
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.run_config()?;
    let jobs = ReplicateJob::plan(&config);

    info!(
        replicates = config.replicates,
        rounds = config.simulation.num_rounds,
        width = config.simulation.grid.width,
        seed = ?config.seed,
        "Starting run"
    );

    let results = tokio::select! {
        results = runner::run_replicates(jobs, config.max_concurrent_replicates) => results?,
        _ = shutdown_signal() => {
            warn!("Run interrupted; no output written");
            std::process::exit(130);
        }
    };

    let rows = match &args.output {
        Some(path) => {
            let rows = export::write_records_to(path, &results)?;
            println!("Wrote {} rows to {}", rows, path.display());
            rows
        }
        None => export::write_records(std::io::stdout().lock(), &results)?,
    };

    if let Some(path) = &args.summary {
        export::RunSummary::from_results(&results).write_to(path)?;
        info!(path = %path.display(), "Summary written");
    }

    info!(rows, replicates = results.len(), "Run complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
