//! Test harness: a running interface whose buses end in the test.
//!
//! The test plays every other node on both buses: it reads what the
//! interface transmits and injects frames as if received.

use crate::adapters::MemoryBus;
use crate::config::IpmbConfig;
use crate::dispatch::CommandDispatchTable;
use crate::domain::{BusId, Message};
use crate::service::{IpmbHandle, IpmbService};
use crate::transport::{DualBusTransport, FrameSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct BusHarness {
    pub handle: IpmbHandle,
    pub task: JoinHandle<()>,
    pub buses: [Arc<MemoryBus>; 2],
    pub sinks: [FrameSink; 2],
    wires: [mpsc::UnboundedReceiver<Vec<u8>>; 2],
}

impl BusHarness {
    /// Spawn an interface with a dispatch table that drops unknown commands.
    pub fn start(config: IpmbConfig) -> Self {
        Self::with_dispatch(config, Arc::new(CommandDispatchTable::new()))
    }

    pub fn with_dispatch(config: IpmbConfig, dispatch: Arc<CommandDispatchTable>) -> Self {
        let (bus_a, wire_a) = MemoryBus::new();
        let (bus_b, wire_b) = MemoryBus::new();
        let (transport, sinks) = DualBusTransport::new(
            bus_a.clone(),
            bus_b.clone(),
            config.receive_queue_depth,
        );
        let (service, handle) = IpmbService::new(config, transport, dispatch);
        Self {
            handle,
            task: service.spawn(),
            buses: [bus_a, bus_b],
            sinks,
            wires: [wire_a, wire_b],
        }
    }

    /// Next frame transmitted on either bus.
    pub async fn next_frame(&mut self) -> Option<(BusId, Vec<u8>)> {
        let [a, b] = &mut self.wires;
        tokio::select! {
            Some(frame) = a.recv() => Some((BusId::A, frame)),
            Some(frame) = b.recv() => Some((BusId::B, frame)),
            else => None,
        }
    }

    /// Next transmitted frame, decoded.
    pub async fn next_message(&mut self) -> Option<(BusId, Message)> {
        let (bus, frame) = self.next_frame().await?;
        let target = match frame.first() {
            Some(0x00) | None => 0x00,
            Some(addr) => *addr,
        };
        Message::decode(&frame, target).ok().map(|msg| (bus, msg))
    }

    /// Frame already transmitted, without waiting.
    pub fn try_next_frame(&mut self) -> Option<(BusId, Vec<u8>)> {
        for bus in BusId::ALL {
            if let Ok(frame) = self.wires[bus.index()].try_recv() {
                return Some((bus, frame));
            }
        }
        None
    }

    /// Deliver `msg` as if received on `bus`.
    pub fn inject(&self, bus: BusId, msg: &Message) {
        let frame = msg.encode().unwrap_or_default();
        self.inject_raw(bus, frame);
    }

    pub fn inject_raw(&self, bus: BusId, frame: Vec<u8>) {
        self.sinks[bus.index()].deliver(frame);
    }
}
