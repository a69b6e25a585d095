//! tether-launcher - supervises a single worker process
//!
//! Launches the configured worker, relays everything it writes to stdout,
//! heartbeats it over the control channel, forwards termination signals as
//! a graceful shutdown request, and exits with the worker's exit code.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tether_core::{
    ConfigOverrides, ProcessSupervisor, SupervisorConfig, load_config, resolve_config,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Launches a worker process and supervises it until exit
#[derive(Parser, Debug)]
#[command(name = "tether-launcher")]
#[command(about = "Launches a worker process and supervises it until exit", long_about = None)]
struct Args {
    /// Worker executable path
    worker: Option<PathBuf>,

    /// Script path handed to the worker as its first argument
    script: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for channel sockets (or set TETHER_RUNTIME_DIR)
    #[arg(long, env = "TETHER_RUNTIME_DIR")]
    runtime_dir: Option<PathBuf>,

    /// Heartbeat cadence in milliseconds
    #[arg(long)]
    heartbeat_interval_ms: Option<u64>,

    /// Run-loop poll tick in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Seconds to wait for the worker's control connection; 0 waits forever
    #[arg(long)]
    connect_timeout_secs: Option<u64>,

    /// Extra argument appended to the worker command line (repeatable)
    #[arg(long = "worker-arg")]
    worker_args: Vec<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn build_config(args: &Args) -> Result<SupervisorConfig> {
    let file = match &args.config {
        Some(path) => Some(
            load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
        ),
        None => None,
    };

    let overrides = ConfigOverrides {
        worker: args.worker.clone(),
        script: args.script.clone(),
        worker_args: args.worker_args.clone(),
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        poll_interval_ms: args.poll_interval_ms,
        connect_timeout_secs: args.connect_timeout_secs,
        runtime_dir: args.runtime_dir.clone(),
    };

    Ok(resolve_config(file, overrides)?)
}

async fn run(args: &Args) -> Result<i32> {
    let config = build_config(args)?;

    info!(
        worker = %config.worker.display(),
        script = %config.script.display(),
        "launching worker"
    );

    let mut supervisor = ProcessSupervisor::new(config);
    Ok(supervisor.run().await?)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr; stdout is reserved for relayed worker output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tether launcher starting");

    let code = match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };

    std::process::exit(code);
}
