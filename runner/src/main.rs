mod config;
mod estimate;
mod executors;
mod expansion;
mod grid;
mod template;

use crate::{config::BulkConfig, executors::Executors};
use clap::{Args, Parser, Subcommand};
use std::{error::Error, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "apm-bulk",
    about = "Bulk runner for aperture map simulations",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log debug output unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write all input files and launch the simulations
    Run(RunArgs),
    /// Write all input files and report the estimated RAM of every run
    DryRun(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Batch configuration in YAML
    config: PathBuf,
    /// Override the number of parallel simulations
    #[arg(long)]
    slots: Option<usize>,
    /// Override the system memory in GB
    #[arg(long)]
    memory: Option<f64>,
    /// Override the countdown before the first launch, in seconds
    #[arg(long)]
    start_delay: Option<f64>,
}

impl RunArgs {
    fn load(&self) -> Result<BulkConfig, config::ConfigErrors> {
        let mut config = BulkConfig::load(&self.config)?;

        if let Some(slots) = self.slots {
            config.executor.slots = slots;
        }
        if let Some(memory) = self.memory {
            config.executor.system_memory = memory;
        }
        if let Some(start_delay) = self.start_delay {
            config.executor.start_delay = start_delay;
        }

        if config.preflight_checks() {
            return Err(config::ConfigErrors::Preflight);
        }

        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();

    if let Ok(directive) = format!("apm_bulk_runner={level}").parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// log an error followed by all of its sources
fn report(error: &dyn Error) {
    error!("{error}");

    let mut source = error.source();
    while let Some(cause) = source {
        error!("  caused by: {cause}");
        source = cause.source();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (args, dry_run) = match &cli.command {
        Commands::Run(args) => (args, false),
        Commands::DryRun(args) => (args, true),
    };

    let config = match args.load() {
        Ok(config) => config,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };

    info!(config = ?args.config, dry_run, "Loaded batch configuration");

    match Executors::load(config, dry_run).execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
