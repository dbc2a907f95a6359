//! # IPMC Runtime
//!
//! Entry point: load configuration, install logging, run until Ctrl-C.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Install the log subscriber
//! 3. Validate configuration and start the subsystems
//! 4. Report the handle closed, as a seated board would

use anyhow::{Context, Result};
use hotswap::HandleState;
use ipmc_runtime::{IpmcConfig, IpmcRuntime};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = IpmcConfig::from_env();
    ipmc_telemetry::init_logging(&config.telemetry).context("Failed to initialize logging")?;

    let runtime = IpmcRuntime::start(config)
        .await
        .context("Invalid IPMC configuration")?;
    runtime.set_handle(HandleState::Closed);

    info!("IPMC is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    runtime.shutdown().await;
    Ok(())
}
