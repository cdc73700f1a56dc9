//! Vigil: health-checked worker process.
//!
//! This is the application entry point. It loads configuration from an optional
//! TOML file and the environment, initializes tracing, binds the HTTP listener,
//! starts the supervised worker and serves probes until SIGINT/SIGTERM.

use std::path::PathBuf;

use clap::Parser;

use vigil::config::AppConfig;
use vigil::supervisor::PulseWorker;
use vigil::{app, logging};

/// Vigil: a health-checked process supervising a background worker
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about)]
struct Args {
    /// Path to configuration file (defaults to config/vigil.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter (e.g., "vigil=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (file, then environment overrides)
    let config = AppConfig::load(args.config.as_deref())?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = logging::resolve_filter(
        args.log_level,
        std::env::var("RUST_LOG").ok(),
        config.default_log_filter(),
    );
    logging::init(&log_filter, &config.logging.format);

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        host = %config.http.host,
        port = config.http.port,
        tick_interval_secs = config.worker.tick_interval_seconds,
        stale_after_secs = config.worker.stale_after_seconds,
        "Loaded configuration"
    );

    if let Err(e) = app::run(config, PulseWorker::new()).await {
        tracing::error!(error = %e, "Exiting");
        return Err(e.into());
    }

    Ok(())
}
