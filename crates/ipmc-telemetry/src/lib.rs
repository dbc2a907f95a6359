//! # IPMC Telemetry
//!
//! Logging and metrics setup shared by every IPMC binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipmc_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Full filter directive, overrides `IPMC_LOG_LEVEL` |
//! | `IPMC_LOG_LEVEL` | `info` | Log level filter |
//! | `IPMC_LOG_FORMAT` | `pretty` | `pretty` or `json` |
//! | `IPMC_METRICS` | `false` | Refresh Prometheus gauges |
//! | `IPMC_SERVICE_NAME` | `ipmc` | Service name in the startup log |
//!
//! The Prometheus registry is behind the `metrics` feature.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod logging;
#[cfg(feature = "metrics")]
pub mod metrics;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install log subscriber: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}
