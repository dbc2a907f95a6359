//! # Subsystem Container
//!
//! Builds the subsystems in dependency order:
//!
//! ```text
//! Level 0: in-process buses, event bus
//! Level 1: IPMB interface (transport + dispatch table)
//! Level 2: hot-swap controller (reports through the IPMB interface)
//! Level 3: PICMG handlers, simulated payload, simulated shelf
//! ```
//!
//! The controller keeps only a weak reference to the payload, so the
//! container owns the payload for the life of the process.

use std::sync::Arc;

use hotswap::{HotswapController, PicmgHandler, PlatformEventSink};
use ipmb_transport::adapters::MemoryBus;
use ipmb_transport::{CommandDispatchTable, DualBusTransport, IpmbApi, IpmbHandle, IpmbService};
use ipmc_bus::{EventPublisher, InMemoryEventBus};
use tokio::runtime::Handle;
use tracing::info;

use crate::adapters::{BusWires, EventFanout, SimulatedPayload, SimulatedShelf};
use crate::container::config::IpmcConfig;

/// Central container holding all subsystem instances.
pub struct IpmcContainer {
    pub config: IpmcConfig,

    // =========================================================================
    // LEVEL 0
    // =========================================================================
    /// Bus drivers, A then B.
    pub buses: [Arc<MemoryBus>; 2],

    pub event_bus: Arc<InMemoryEventBus>,

    // =========================================================================
    // LEVEL 1-3
    // =========================================================================
    pub ipmb: IpmbHandle,

    pub hotswap: Arc<HotswapController>,

    pub payload: Arc<SimulatedPayload>,

    pub shelf: Arc<SimulatedShelf>,
}

impl IpmcContainer {
    /// Build every subsystem.
    ///
    /// Returns the IPMB worker, not yet spawned, and the far end of both
    /// bus wires.
    pub fn new(config: IpmcConfig, runtime: Handle) -> (Self, IpmbService, BusWires) {
        let (bus_a, wire_a) = MemoryBus::new();
        let (bus_b, wire_b) = MemoryBus::new();
        let event_bus = Arc::new(InMemoryEventBus::new());

        let (transport, sinks) = DualBusTransport::new(
            bus_a.clone(),
            bus_b.clone(),
            config.ipmb.receive_queue_depth,
        );
        let dispatch = Arc::new(CommandDispatchTable::with_invalid_command_default());
        let (service, ipmb) = IpmbService::new(config.ipmb.clone(), transport, dispatch);

        let platform_events = PlatformEventSink::new(
            Arc::new(ipmb.clone()) as Arc<dyn IpmbApi>,
            config.hotswap.event_receiver,
            config.hotswap.sensor_number,
        );
        let fanout = EventFanout::new(
            platform_events,
            Arc::clone(&event_bus) as Arc<dyn EventPublisher>,
            config.telemetry.metrics_enabled,
            runtime.clone(),
        );
        let hotswap = Arc::new(HotswapController::new(
            config.hotswap.controller_config(),
            Arc::new(fanout),
        ));

        PicmgHandler::new(Arc::clone(&hotswap)).register(ipmb.dispatch_table());

        let payload = Arc::new(SimulatedPayload::new(
            &hotswap,
            config.hotswap.power_up_delay,
            config.hotswap.power_down_delay,
            runtime,
        ));
        hotswap.attach_payload(&payload);

        let shelf = Arc::new(SimulatedShelf::new(
            config.hotswap.event_receiver,
            config.ipmb.local_address,
            sinks,
        ));

        info!(
            address = %format!("{:#04x}", config.ipmb.local_address),
            fru = config.hotswap.fru_id,
            "IPMC subsystems initialized"
        );

        let container = Self {
            config,
            buses: [bus_a, bus_b],
            event_bus,
            ipmb,
            hotswap,
            payload,
            shelf,
        };
        (container, service, [wire_a, wire_b])
    }
}
