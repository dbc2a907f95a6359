//! Simulated shelf manager on the far end of both in-process buses.
//!
//! Acknowledges every Platform Event Message it receives, counts the
//! hot-swap events among them, and can issue commands to the IPMC and
//! wait for the reply.

use hotswap::domain::event::CMD_PLATFORM_EVENT;
use hotswap::HotswapEvent;
use ipmb_transport::domain::completion::{CC_SUCCESS, NETFN_SENSOR_EVENT};
use ipmb_transport::{BusId, CodecError, FrameSink, Message};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

/// How long [`SimulatedShelf::command`] waits for the reply.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Frames transmitted by the IPMC, one receiver per bus.
pub type BusWires = [mpsc::UnboundedReceiver<Vec<u8>>; 2];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShelfError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("No reply to cmd {cmd:#04x} seq {seq}")]
    Timeout { cmd: u8, seq: u8 },

    #[error("Shelf stopped")]
    Stopped,
}

pub struct SimulatedShelf {
    address: u8,
    ipmc_address: u8,
    sinks: [FrameSink; 2],
    next_seq: AtomicU8,
    awaiting: Mutex<HashMap<(u8, u8), oneshot::Sender<Message>>>,
    platform_events: AtomicU64,
    hotswap_events: Mutex<Vec<HotswapEvent>>,
}

impl SimulatedShelf {
    pub fn new(address: u8, ipmc_address: u8, sinks: [FrameSink; 2]) -> Self {
        Self {
            address,
            ipmc_address,
            sinks,
            next_seq: AtomicU8::new(0),
            awaiting: Mutex::new(HashMap::new()),
            platform_events: AtomicU64::new(0),
            hotswap_events: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Platform Event Messages acknowledged so far.
    pub fn platform_events(&self) -> u64 {
        self.platform_events.load(Ordering::SeqCst)
    }

    /// Hot-swap events reported by the IPMC, in arrival order. Events sent
    /// close together on different buses may arrive out of order.
    pub fn hotswap_events(&self) -> Vec<HotswapEvent> {
        self.hotswap_events.lock().clone()
    }

    /// Send a request to the IPMC on bus A and wait for its reply.
    pub async fn command(&self, net_fn: u8, cmd: u8, data: Vec<u8>) -> Result<Message, ShelfError> {
        let mut request = Message::request(self.address, self.ipmc_address, net_fn, cmd, data);
        request.rq_seq = self.next_seq.fetch_add(1, Ordering::Relaxed) & 0x3F;
        let frame = request.encode()?;

        let (tx, rx) = oneshot::channel();
        let key = (cmd, request.rq_seq);
        self.awaiting.lock().insert(key, tx);
        self.sinks[BusId::A.index()].deliver(frame);

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ShelfError::Stopped),
            Err(_) => {
                self.awaiting.lock().remove(&key);
                Err(ShelfError::Timeout {
                    cmd,
                    seq: request.rq_seq,
                })
            }
        }
    }

    /// Serve both wires until shutdown or until the IPMC side goes away.
    pub async fn run(self: Arc<Self>, wires: BusWires, mut shutdown: watch::Receiver<bool>) {
        let [mut wire_a, mut wire_b] = wires;
        info!(address = %format!("{:#04x}", self.address), "Simulated shelf manager started");

        loop {
            let (bus, frame) = tokio::select! {
                _ = shutdown.changed() => break,
                Some(frame) = wire_a.recv() => (BusId::A, frame),
                Some(frame) = wire_b.recv() => (BusId::B, frame),
                else => break,
            };
            self.on_frame(bus, &frame);
        }

        self.awaiting.lock().clear();
        info!("Simulated shelf manager stopped");
    }

    fn on_frame(&self, bus: BusId, frame: &[u8]) {
        let msg = match Message::decode(frame, self.address) {
            Ok(msg) => msg,
            Err(e) => {
                trace!(%bus, error = %e, "Frame not for the shelf");
                return;
            }
        };

        if msg.is_response() {
            match self.awaiting.lock().remove(&(msg.cmd, msg.rq_seq)) {
                Some(tx) => {
                    let _ = tx.send(msg);
                }
                None => debug!(%msg, "Unsolicited response at shelf"),
            }
            return;
        }

        if msg.net_fn == NETFN_SENSOR_EVENT && msg.cmd == CMD_PLATFORM_EVENT {
            self.platform_events.fetch_add(1, Ordering::SeqCst);
            if let Ok((_, event)) = HotswapEvent::from_platform_event(&msg.data) {
                info!(%event, "Hot-swap event received");
                self.hotswap_events.lock().push(event);
            }
            self.answer(bus, &msg, vec![CC_SUCCESS]);
            return;
        }

        debug!(%msg, "Request ignored by simulated shelf");
    }

    fn answer(&self, bus: BusId, request: &Message, data: Vec<u8>) {
        match request.prepare_reply(data).encode() {
            Ok(frame) => {
                self.sinks[bus.index()].deliver(frame);
            }
            Err(e) => warn!(error = %e, "Shelf reply not encodable"),
        }
    }
}
