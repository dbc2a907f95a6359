//! # IPMC Runtime
//!
//! Starts the subsystems in the container and the background tasks around
//! them, and stops them again.
//!
//! ## Tasks
//!
//! - IPMB worker (transport, retries, dispatch)
//! - Simulated shelf manager, when enabled
//! - Transport event monitor (logs delivery failures from the event bus)
//! - Metrics refresh, when enabled

use std::sync::Arc;
use std::time::Duration;

use hotswap::{HandleState, HotswapController};
use ipmb_transport::BusId;
use ipmc_bus::{EventFilter, EventPublisher, EventTopic, IpmcEvent, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::{ConfigError, IpmcConfig, IpmcContainer};

/// How long shutdown waits for each task.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The running IPMC.
pub struct IpmcRuntime {
    container: Arc<IpmcContainer>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl IpmcRuntime {
    /// Validate the configuration, build the subsystems and start every task.
    pub async fn start(config: IpmcConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (container, service, wires) =
            IpmcContainer::new(config, tokio::runtime::Handle::current());
        let container = Arc::new(container);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![service.spawn()];

        if container.config.simulate_shelf {
            let shelf = Arc::clone(&container.shelf);
            tasks.push(tokio::spawn(shelf.run(wires, shutdown_rx.clone())));
        } else {
            warn!("No shelf on the buses; platform events will not be acknowledged");
        }

        tasks.push(tokio::spawn(monitor_transport(
            container.event_bus.subscribe(EventFilter::topics(vec![EventTopic::Transport])),
            shutdown_rx.clone(),
        )));

        if container.config.telemetry.metrics_enabled {
            match ipmc_telemetry::metrics::register_metrics() {
                Ok(()) => tasks.push(tokio::spawn(refresh_metrics(
                    Arc::clone(&container),
                    shutdown_rx,
                ))),
                Err(e) => error!(error = %e, "Metrics disabled"),
            }
        }

        info!(
            address = %format!("{:#04x}", container.config.ipmb.local_address),
            "IPMC running"
        );

        Ok(Self {
            container,
            shutdown_tx,
            tasks,
        })
    }

    pub fn container(&self) -> Arc<IpmcContainer> {
        Arc::clone(&self.container)
    }

    pub fn hotswap(&self) -> &Arc<HotswapController> {
        &self.container.hotswap
    }

    /// Subscribe to IPMC events.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.container.event_bus.subscribe(filter)
    }

    /// Report the physical handle position.
    pub fn set_handle(&self, handle: HandleState) {
        self.container.hotswap.set_physical_handle(handle);
    }

    /// Administratively enable or disable one bus.
    pub fn set_bus_enabled(&self, bus: BusId, enabled: bool) {
        if enabled {
            self.container.ipmb.enable_bus(bus);
        } else {
            self.container.ipmb.disable_bus(bus);
        }
        self.container
            .event_bus
            .publish(IpmcEvent::BusEnableChanged { bus, enabled });
    }

    /// Stop all tasks. In-flight requests complete as shut down.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        self.shutdown_tx.send_replace(true);
        self.container.ipmb.shutdown();

        for task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Task did not stop within the grace period");
            }
        }
        info!("Shutdown complete");
    }
}

async fn monitor_transport(mut events: Subscription, mut shutdown: watch::Receiver<bool>) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => return,
            event = events.recv() => event,
        };
        match event {
            Some(IpmcEvent::DeliveryFailed { request, reason }) => {
                warn!(%request, %reason, "Delivery failed");
            }
            Some(_) => {}
            None => return,
        }
    }
}

async fn refresh_metrics(container: Arc<IpmcContainer>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(container.config.metrics_interval);
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                ipmc_telemetry::metrics::observe_ipmb_stats(&container.ipmb.stats());
            }
        }
    }
}
