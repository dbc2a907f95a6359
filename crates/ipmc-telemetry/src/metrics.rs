//! Prometheus metrics for the IPMC core.
//!
//! All metrics follow the naming convention: `ipmc_<subsystem>_<metric>`
//!
//! The IPMB counters live in the transport as atomics; they are copied into
//! gauges on each refresh rather than incremented here.

use hotswap::HotswapEvent;
use ipmb_transport::StatsSnapshot;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // IPMB TRANSPORT
    // =========================================================================

    /// Transport statistics by name
    pub static ref IPMB_STATS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ipmc_ipmb_stat", "IPMB transport statistics"),
        &["stat"]
    ).expect("metric creation failed");

    // =========================================================================
    // HOT-SWAP
    // =========================================================================

    /// Current M-state of the FRU (1..7)
    pub static ref HOTSWAP_MSTATE: IntGauge = IntGauge::new(
        "ipmc_hotswap_mstate",
        "Current hot-swap M-state"
    ).expect("metric creation failed");

    /// Hot-swap events by entered state
    pub static ref HOTSWAP_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("ipmc_hotswap_transitions_total", "Hot-swap events by new M-state"),
        &["to"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(IPMB_STATS.clone()),
        Box::new(HOTSWAP_MSTATE.clone()),
        Box::new(HOTSWAP_TRANSITIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Copy a transport statistics snapshot into the gauges.
pub fn observe_ipmb_stats(stats: &StatsSnapshot) {
    for (name, value) in stats.fields() {
        IPMB_STATS
            .with_label_values(&[name])
            .set(i64::try_from(value).unwrap_or(i64::MAX));
    }
}

/// Record a hot-swap event.
pub fn observe_hotswap(event: &HotswapEvent) {
    let to = event.new_state.to_string();
    HOTSWAP_MSTATE.set(i64::from(event.new_state.as_u8()));
    HOTSWAP_TRANSITIONS.with_label_values(&[to.as_str()]).inc();
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap::{MState, TransitionReason};

    #[test]
    fn test_register_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_stats_exported_by_name() {
        register_metrics().unwrap();
        observe_ipmb_stats(&StatsSnapshot {
            send_attempts: 12,
            ..StatsSnapshot::default()
        });
        assert_eq!(IPMB_STATS.with_label_values(&["send_attempts"]).get(), 12);

        let text = gather_text().unwrap();
        assert!(text.contains("ipmc_ipmb_stat{stat=\"send_attempts\"} 12"));
    }

    #[test]
    fn test_hotswap_event_sets_mstate() {
        register_metrics().unwrap();
        observe_hotswap(&HotswapEvent {
            fru_id: 0,
            new_state: MState::M5,
            previous_state: MState::M4,
            reason: TransitionReason::OperatorSwitch,
        });
        assert!(HOTSWAP_TRANSITIONS.with_label_values(&["M5"]).get() >= 1);
        assert!(gather_text().unwrap().contains("ipmc_hotswap_transitions_total"));
    }
}
