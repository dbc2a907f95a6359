//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Rendering of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable, for consoles.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    pub log_format: LogFormat,

    /// Whether the runtime refreshes the Prometheus gauges
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ipmc".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IPMC_SERVICE_NAME`: Service name (default: ipmc)
    /// - `IPMC_LOG_LEVEL`: Log level (default: info)
    /// - `IPMC_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    /// - `IPMC_METRICS`: Enable metrics refresh (default: false)
    ///
    /// `RUST_LOG`, when set, takes precedence over `IPMC_LOG_LEVEL` at
    /// subscriber installation.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall
    /// back to their defaults.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            service_name: lookup("IPMC_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("IPMC_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: lookup("IPMC_LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
            metrics_enabled: lookup("IPMC_METRICS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }
}
