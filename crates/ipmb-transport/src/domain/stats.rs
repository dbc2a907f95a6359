//! Transport statistics.
//!
//! Plain atomics so the receive path can count from any context without
//! taking a lock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IpmbStats {
    pub messages_received: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub send_attempts: AtomicU64,
    pub send_failures: AtomicU64,
    pub no_available_sequence: AtomicU64,
    pub no_bus_available: AtomicU64,
    pub unexpected_replies: AtomicU64,
    pub duplicate_requests: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub receive_overflows: AtomicU64,
    pub sendq_highwater: AtomicU64,
}

impl IpmbStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn raise_highwater(&self, depth: usize) {
        self.sendq_highwater
            .fetch_max(depth as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            messages_received: load(&self.messages_received),
            messages_delivered: load(&self.messages_delivered),
            send_attempts: load(&self.send_attempts),
            send_failures: load(&self.send_failures),
            no_available_sequence: load(&self.no_available_sequence),
            no_bus_available: load(&self.no_bus_available),
            unexpected_replies: load(&self.unexpected_replies),
            duplicate_requests: load(&self.duplicate_requests),
            malformed_frames: load(&self.malformed_frames),
            receive_overflows: load(&self.receive_overflows),
            sendq_highwater: load(&self.sendq_highwater),
        }
    }
}

/// Point-in-time copy of [`IpmbStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub messages_delivered: u64,
    pub send_attempts: u64,
    pub send_failures: u64,
    pub no_available_sequence: u64,
    pub no_bus_available: u64,
    pub unexpected_replies: u64,
    pub duplicate_requests: u64,
    pub malformed_frames: u64,
    pub receive_overflows: u64,
    pub sendq_highwater: u64,
}

impl StatsSnapshot {
    /// Name/value pairs, for exporters.
    pub fn fields(&self) -> [(&'static str, u64); 11] {
        [
            ("messages_received", self.messages_received),
            ("messages_delivered", self.messages_delivered),
            ("send_attempts", self.send_attempts),
            ("send_failures", self.send_failures),
            ("no_available_sequence", self.no_available_sequence),
            ("no_bus_available", self.no_bus_available),
            ("unexpected_replies", self.unexpected_replies),
            ("duplicate_requests", self.duplicate_requests),
            ("malformed_frames", self.malformed_frames),
            ("receive_overflows", self.receive_overflows),
            ("sendq_highwater", self.sendq_highwater),
        ]
    }
}
