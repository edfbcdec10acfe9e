//! VeloLink agent binary.
//!
//! Streams Indoor Bike Data from a BLE fitness machine to an HTTP
//! collector, restarting the whole pipeline after any failure.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use velolink_agent::AgentConfig;
use velolink_core::HttpSink;
use velolink_core::supervisor;

/// VeloLink agent - stream indoor-bike telemetry to a collector.
#[derive(Parser, Debug)]
#[command(name = "velolink-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collector base URL (overrides config)
    #[arg(short = 'u', long)]
    collector_url: Option<String>,

    /// Only accept bikes whose advertised name contains this substring
    /// (overrides config)
    #[arg(short, long)]
    name: Option<String>,

    /// Source tag stamped on uploaded readings (overrides config)
    #[arg(short, long)]
    source: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = if args.quiet {
        EnvFilter::new("warn")
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("velolink_agent=info,velolink_core=info"))
    };
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::load_default().unwrap_or_default(),
    };

    if let Some(url) = args.collector_url {
        config.collector.url = url;
    }
    if let Some(name) = args.name {
        config.device.name_contains = Some(name);
    }
    if let Some(source) = args.source {
        config.collector.source = source;
    }
    config.validate()?;

    let filter = config.device.to_filter();
    let scan_options = config.scan.to_options();
    let session_options = config.session.to_options();
    let pump_options = config.collector.to_pump_options();
    let supervisor_options = config.supervisor.to_options();

    let sink = HttpSink::with_timeout(&config.collector.url, config.collector.timeout())?;

    info!(
        "Starting VeloLink agent: collector {}, device filter {}",
        sink.base_url(),
        filter.describe()
    );

    // supervisor::run never returns; the empty match makes that explicit.
    match supervisor::run(
        &sink,
        &filter,
        &scan_options,
        &session_options,
        &pump_options,
        &supervisor_options,
    )
    .await
    {}
}
