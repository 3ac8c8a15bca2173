//! Sessionforge Daemon
//!
//! Background service that validates the chat platform session at startup
//! and keeps its credentials fresh until stopped.
//!
//! # Running
//!
//! ```bash
//! cargo run -p sessionforge-daemon
//! # or after install:
//! sessionforged
//! ```

use anyhow::Result;
use sessionforge_daemon::{Daemon, DaemonConfig, load_config};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config);

    info!("Starting Sessionforge daemon...");
    info!("Loaded configuration from {:?}", config.config_path);

    run_daemon(config).await
}

fn init_logging(config: &DaemonConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!(
        credential_file = %config.credentials.file.display(),
        base_url = %config.api.base_url,
        "Daemon starting"
    );

    let daemon = Daemon::from_config(&config)?;

    info!("Press Ctrl+C to stop.");
    daemon
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
}
