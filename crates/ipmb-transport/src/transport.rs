//! # Dual Bus Transport
//!
//! Owns the two physical bus drivers (IPMB-A and IPMB-B).
//!
//! ```text
//!               ┌────────────── DualBusTransport ──────────────┐
//!  send(msg) ──→│ select_bus(msg, retry) ──→ driver A | driver B│
//!               │                                              │
//!  ISR ─deliver→│ FrameSink A ──┐                              │
//!  ISR ─deliver→│ FrameSink B ──┴──→ recv() (first ready wins) │
//!               └──────────────────────────────────────────────┘
//! ```
//!
//! Enable/disable is administrative state kept in [`BusControls`]; a failed
//! transmission never disables a bus.

use crate::domain::{select_bus, BusId, IpmbStats, Message};
use crate::events::TransportError;
use crate::ports::IpmbDriver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Default depth of each bus receive queue.
pub const DEFAULT_RECEIVE_DEPTH: usize = 32;

/// A raw frame and the bus it arrived on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub bus: BusId,
    pub bytes: Vec<u8>,
}

/// Hand-off point from a bus driver's receive path into the transport.
///
/// `deliver` never waits, so it may be called from interrupt-adjacent
/// contexts. A full queue drops the frame and counts an overflow.
#[derive(Clone, Debug)]
pub struct FrameSink {
    bus: BusId,
    tx: mpsc::Sender<Vec<u8>>,
    stats: Arc<IpmbStats>,
}

impl FrameSink {
    pub fn bus(&self) -> BusId {
        self.bus
    }

    pub fn deliver(&self, frame: Vec<u8>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(_) => {
                IpmbStats::incr(&self.stats.receive_overflows);
                false
            }
        }
    }
}

/// Administrative enable flags for both buses.
#[derive(Clone, Debug)]
pub struct BusControls {
    enabled: Arc<[AtomicBool; 2]>,
}

impl BusControls {
    fn new() -> Self {
        Self {
            enabled: Arc::new([AtomicBool::new(true), AtomicBool::new(true)]),
        }
    }

    pub fn set_enabled(&self, bus: BusId, enabled: bool) {
        let previous = self.enabled[bus.index()].swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(%bus, enabled, "Bus administrative state changed");
        }
    }

    pub fn is_enabled(&self, bus: BusId) -> bool {
        self.enabled[bus.index()].load(Ordering::SeqCst)
    }

    pub fn enabled(&self) -> [bool; 2] {
        [self.is_enabled(BusId::A), self.is_enabled(BusId::B)]
    }

    pub fn any_enabled(&self) -> bool {
        self.enabled().contains(&true)
    }
}

struct BusLink {
    driver: Arc<dyn IpmbDriver>,
    rx: mpsc::Receiver<Vec<u8>>,
    open: bool,
}

/// The redundant bus pair.
pub struct DualBusTransport {
    links: [BusLink; 2],
    controls: BusControls,
    stats: Arc<IpmbStats>,
}

impl DualBusTransport {
    /// Build the transport and the receive sinks to give each driver.
    pub fn new(
        bus_a: Arc<dyn IpmbDriver>,
        bus_b: Arc<dyn IpmbDriver>,
        receive_depth: usize,
    ) -> (Self, [FrameSink; 2]) {
        let stats = Arc::new(IpmbStats::default());
        let depth = receive_depth.max(1);
        let (tx_a, rx_a) = mpsc::channel(depth);
        let (tx_b, rx_b) = mpsc::channel(depth);

        let sinks = [
            FrameSink {
                bus: BusId::A,
                tx: tx_a,
                stats: Arc::clone(&stats),
            },
            FrameSink {
                bus: BusId::B,
                tx: tx_b,
                stats: Arc::clone(&stats),
            },
        ];
        let transport = Self {
            links: [
                BusLink {
                    driver: bus_a,
                    rx: rx_a,
                    open: true,
                },
                BusLink {
                    driver: bus_b,
                    rx: rx_b,
                    open: true,
                },
            ],
            controls: BusControls::new(),
            stats,
        };
        (transport, sinks)
    }

    pub fn controls(&self) -> BusControls {
        self.controls.clone()
    }

    pub fn stats(&self) -> Arc<IpmbStats> {
        Arc::clone(&self.stats)
    }

    /// Bus that would carry this attempt, if any is enabled.
    pub fn select(&self, msg: &Message, retry_count: u8) -> Option<BusId> {
        select_bus(msg, retry_count, self.controls.enabled())
    }

    /// Encode and transmit one attempt of `msg`.
    pub async fn send(&self, msg: &Message, retry_count: u8) -> Result<BusId, TransportError> {
        let bus = self
            .select(msg, retry_count)
            .ok_or(TransportError::NoBusEnabled)?;
        let frame = msg.encode()?;
        trace!(%bus, retry_count, %msg, "Transmitting");
        if self.links[bus.index()].driver.send_frame(&frame).await {
            Ok(bus)
        } else {
            debug!(%bus, retry_count, %msg, "Transmission failed");
            Err(TransportError::TransmitFailed(bus))
        }
    }

    /// Next frame from whichever bus has one first.
    ///
    /// Returns `None` once every sink of both buses has been dropped.
    pub async fn recv(&mut self) -> Option<ReceivedFrame> {
        let [a, b] = &mut self.links;
        loop {
            tokio::select! {
                frame = a.rx.recv(), if a.open => match frame {
                    Some(bytes) => return Some(ReceivedFrame { bus: BusId::A, bytes }),
                    None => a.open = false,
                },
                frame = b.rx.recv(), if b.open => match frame {
                    Some(bytes) => return Some(ReceivedFrame { bus: BusId::B, bytes }),
                    None => b.open = false,
                },
                else => return None,
            }
        }
    }

    /// [`recv`](Self::recv) bounded by `timeout`.
    pub async fn receive(&mut self, timeout: Duration) -> Option<ReceivedFrame> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }
}
