//! trueno-pulse - host resource sampler.
//!
//! Polls CPU, memory and disk on a fixed interval, prints one line per tick
//! and forwards every sample to the configured sinks until interrupted.
//!
//! Run: `trueno-pulse --config trueno-pulse.json`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use trueno_pulse::prelude::*;

/// trueno-pulse: host resource sampler
#[derive(Parser, Debug)]
#[command(name = "trueno-pulse")]
#[command(author = "PAIML Team")]
#[command(version)]
#[command(about = "Samples CPU, memory and disk usage and fans samples out to sinks", long_about = None)]
struct Cli {
    /// Config file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reader to use: universal, native or auto
    #[arg(long)]
    reader: Option<ReaderMode>,

    /// Poll interval in seconds
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Do not print samples to stdout
    #[arg(long)]
    no_console: bool,

    /// Log filter (e.g. info, debug, trueno_pulse=trace); RUST_LOG wins if set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir().map(|p| p.join("trueno-pulse/config.json")).unwrap_or_else(|| PathBuf::from("trueno-pulse.json"))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the sample lines
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn load_config(path: &Path) -> Result<Config> {
    match Config::load(path) {
        Ok(config) => Ok(config),
        Err(PulseError::ConfigNotFound(missing)) => {
            warn!(path = %missing, "config file not found; using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("failed to load {}", path.display())),
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config(&path)?;

    if let Some(reader) = cli.reader {
        config.reader = reader;
    }
    if let Some(interval) = cli.interval {
        config.interval_seconds = interval;
    }
    if cli.no_console {
        config.enable_console_output = false;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    info!(
        platform = %Platform::detect(),
        reader = %config.reader,
        interval_secs = config.interval_seconds,
        "starting"
    );

    let scheduler = Scheduler::new(config, SinkRegistry::with_builtin());
    scheduler.start().await.context("failed to start sampling")?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for interrupt: {e}; stopping");
    }

    info!("interrupt received; shutting down");
    scheduler.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
