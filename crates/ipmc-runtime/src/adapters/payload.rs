//! Simulated payload power manager.
//!
//! Stands in for board power sequencing: power-up and power-down each
//! complete after a fixed delay on the tokio runtime, then report back to
//! the controller.

use hotswap::{HotswapController, PayloadPower};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

pub struct SimulatedPayload {
    controller: Weak<HotswapController>,
    power_up_delay: Duration,
    power_down_delay: Duration,
    powered: Arc<AtomicBool>,
    runtime: Handle,
}

impl SimulatedPayload {
    pub fn new(
        controller: &Arc<HotswapController>,
        power_up_delay: Duration,
        power_down_delay: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            controller: Arc::downgrade(controller),
            power_up_delay,
            power_down_delay,
            powered: Arc::new(AtomicBool::new(false)),
            runtime,
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }
}

impl PayloadPower for SimulatedPayload {
    fn begin_activation(&self) {
        let controller = self.controller.clone();
        let powered = Arc::clone(&self.powered);
        let delay = self.power_up_delay;
        debug!(?delay, "Payload power-up started");

        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            powered.store(true, Ordering::SeqCst);
            info!("Payload powered");
            if let Some(controller) = controller.upgrade() {
                controller.payload_activation_complete();
            }
        });
    }

    fn deactivate(&self) {
        let controller = self.controller.clone();
        let powered = Arc::clone(&self.powered);
        let delay = self.power_down_delay;
        debug!(?delay, "Payload power-down started");

        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            powered.store(false, Ordering::SeqCst);
            info!("Payload off");
            if let Some(controller) = controller.upgrade() {
                controller.payload_deactivation_complete();
            }
        });
    }
}
