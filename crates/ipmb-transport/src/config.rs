//! Transport configuration.

use crate::domain::RetryPolicy;
use crate::transport::DEFAULT_RECEIVE_DEPTH;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of one IPMB interface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpmbConfig {
    /// 8-bit IPMB address of this node.
    pub local_address: u8,
    /// Retransmissions after the first attempt.
    pub max_retries: u8,
    /// Delay after the first attempt; doubles per retry.
    pub retry_base_delay: Duration,
    /// Ceiling on the delay between attempts.
    pub retry_max_delay: Duration,
    /// How long an inbound request key is remembered for duplicate detection.
    pub duplicate_window: Duration,
    /// Depth of each bus receive queue.
    pub receive_queue_depth: usize,
}

impl Default for IpmbConfig {
    fn default() -> Self {
        Self {
            local_address: 0x20,
            max_retries: 10,
            retry_base_delay: Duration::from_millis(64),
            retry_max_delay: Duration::from_millis(250),
            duplicate_window: Duration::from_secs(5),
            receive_queue_depth: DEFAULT_RECEIVE_DEPTH,
        }
    }
}

impl IpmbConfig {
    pub fn with_address(local_address: u8) -> Self {
        Self {
            local_address,
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }

    /// Minimum age before an outbound sequence may be reused: the bus
    /// sequence expiration interval plus the longest retry run.
    pub fn sequence_reuse_window(&self) -> Duration {
        Duration::from_secs(6) + self.retry_max_delay * u32::from(self.max_retries)
    }
}
