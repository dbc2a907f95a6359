//! # IPMC Configuration
//!
//! Unified configuration for the transport, the hot-swap controller and
//! telemetry, loaded from environment variables.
//!
//! ## Validation
//!
//! - The IPMB address must be a non-zero even 8-bit slave address
//! - A request's full retry run must finish inside the duplicate window,
//!   or the far end would treat a late retry as a new request
//! - Only FRU 0 is managed

use hotswap::adapters::platform_event::DEFAULT_EVENT_RECEIVER;
use hotswap::HotswapConfig;
use ipmb_transport::IpmbConfig;
use ipmc_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Complete IPMC configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpmcConfig {
    pub ipmb: IpmbConfig,
    pub hotswap: HotswapSettings,
    pub telemetry: TelemetryConfig,
    /// Answer Platform Event Messages as the shelf manager would.
    pub simulate_shelf: bool,
    /// How often the metric gauges are refreshed.
    pub metrics_interval: Duration,
}

impl Default for IpmcConfig {
    fn default() -> Self {
        Self {
            ipmb: IpmbConfig::with_address(0x72),
            hotswap: HotswapSettings::default(),
            telemetry: TelemetryConfig::default(),
            simulate_shelf: true,
            metrics_interval: Duration::from_secs(5),
        }
    }
}

/// Hot-swap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotswapSettings {
    pub fru_id: u8,
    /// Sensor number of the FRU hot-swap sensor.
    pub sensor_number: u8,
    /// IPMB address Platform Event Messages are sent to.
    pub event_receiver: u8,
    /// Simulated payload power-up time.
    pub power_up_delay: Duration,
    /// Simulated payload power-down time.
    pub power_down_delay: Duration,
}

impl Default for HotswapSettings {
    fn default() -> Self {
        Self {
            fru_id: 0,
            sensor_number: 0x00,
            event_receiver: DEFAULT_EVENT_RECEIVER,
            power_up_delay: Duration::from_millis(500),
            power_down_delay: Duration::from_millis(200),
        }
    }
}

impl HotswapSettings {
    #[must_use]
    pub fn controller_config(&self) -> HotswapConfig {
        HotswapConfig {
            fru_id: self.fru_id,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("IPMB address {0:#04x} is not a valid slave address (non-zero, even)")]
    InvalidAddress(u8),

    #[error("Event receiver {0:#04x} is not a valid slave address (non-zero, even)")]
    InvalidEventReceiver(u8),

    #[error(
        "{max_retries} retries take {retry_time:?}, not inside the {duplicate_window:?} duplicate window"
    )]
    RetriesOutlastDuplicateWindow {
        max_retries: u8,
        retry_time: Duration,
        duplicate_window: Duration,
    },

    #[error("FRU {0} is not managed; only FRU 0 exists")]
    UnsupportedFru(u8),
}

impl IpmcConfig {
    /// Load configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `IPMC_ADDRESS`: IPMB address, decimal or `0x` hex (default: 0x72)
    /// - `IPMC_MAX_RETRIES`: Retransmissions per request (default: 10)
    /// - `IPMC_EVENT_RECEIVER`: Platform event receiver (default: 0x20)
    /// - `IPMC_FRU_ID`: Managed FRU (default: 0)
    /// - `IPMC_HOTSWAP_SENSOR`: Hot-swap sensor number (default: 0)
    /// - `IPMC_POWER_UP_MS`, `IPMC_POWER_DOWN_MS`: Simulated payload timing
    /// - `IPMC_SIMULATE_SHELF`: Acknowledge platform events locally (default: true)
    /// - `IPMC_METRICS_INTERVAL_MS`: Gauge refresh period (default: 5000)
    /// - plus the telemetry variables (`IPMC_LOG_LEVEL`, `IPMC_LOG_FORMAT`, `IPMC_METRICS`)
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
        let byte = |key: &str, default: u8| lookup(key).and_then(|v| parse_u8(&v)).unwrap_or(default);
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let ipmb = IpmbConfig {
            local_address: byte("IPMC_ADDRESS", defaults.ipmb.local_address),
            max_retries: byte("IPMC_MAX_RETRIES", defaults.ipmb.max_retries),
            ..defaults.ipmb
        };

        let hotswap = HotswapSettings {
            fru_id: byte("IPMC_FRU_ID", defaults.hotswap.fru_id),
            sensor_number: byte("IPMC_HOTSWAP_SENSOR", defaults.hotswap.sensor_number),
            event_receiver: byte("IPMC_EVENT_RECEIVER", defaults.hotswap.event_receiver),
            power_up_delay: millis("IPMC_POWER_UP_MS", defaults.hotswap.power_up_delay),
            power_down_delay: millis("IPMC_POWER_DOWN_MS", defaults.hotswap.power_down_delay),
        };

        Self {
            ipmb,
            hotswap,
            telemetry: TelemetryConfig::from_vars(&lookup),
            simulate_shelf: lookup("IPMC_SIMULATE_SHELF")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.simulate_shelf),
            metrics_interval: millis("IPMC_METRICS_INTERVAL_MS", defaults.metrics_interval),
        }
    }

    /// Check the configuration before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_slave_address(self.ipmb.local_address) {
            return Err(ConfigError::InvalidAddress(self.ipmb.local_address));
        }
        if !is_slave_address(self.hotswap.event_receiver) {
            return Err(ConfigError::InvalidEventReceiver(
                self.hotswap.event_receiver,
            ));
        }

        let retry_time = self.ipmb.retry_policy().worst_case();
        if retry_time >= self.ipmb.duplicate_window {
            return Err(ConfigError::RetriesOutlastDuplicateWindow {
                max_retries: self.ipmb.max_retries,
                retry_time,
                duplicate_window: self.ipmb.duplicate_window,
            });
        }

        if self.hotswap.fru_id != 0 {
            return Err(ConfigError::UnsupportedFru(self.hotswap.fru_id));
        }
        Ok(())
    }
}

fn is_slave_address(address: u8) -> bool {
    address != 0 && address & 0x01 == 0
}

/// Parse `114` or `0x72`.
fn parse_u8(value: &str) -> Option<u8> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
