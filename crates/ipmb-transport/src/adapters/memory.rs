//! In-process bus driver.
//!
//! Transmitted frames are forwarded to an unbounded channel whose receiver
//! plays the rest of the bus: a simulated shelf manager, a peer IPMC or a
//! test.

use crate::ports::IpmbDriver;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct MemoryBus {
    wire: mpsc::UnboundedSender<Vec<u8>>,
    failing: AtomicBool,
    frames_sent: AtomicU64,
}

impl MemoryBus {
    /// A driver and the far end of its wire.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (wire, far_end) = mpsc::unbounded_channel();
        let bus = Arc::new(Self {
            wire,
            failing: AtomicBool::new(false),
            frames_sent: AtomicU64::new(0),
        });
        (bus, far_end)
    }

    /// Make every transmission fail (no acknowledge) until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IpmbDriver for MemoryBus {
    async fn send_frame(&self, frame: &[u8]) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        if self.wire.send(frame.to_vec()).is_err() {
            return false;
        }
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        true
    }
}
