//! Hot-swap event fan-out.
//!
//! Every hot-swap event goes three ways: to the shelf as a Platform Event
//! Message, onto the event bus, and into the metric gauges. A Platform
//! Event Message that cannot be delivered is reported on the bus as
//! [`IpmcEvent::DeliveryFailed`].

use hotswap::{HotswapEvent, HotswapEventSink, PlatformEventSink};
use ipmb_transport::domain::completion::CC_SUCCESS;
use ipmc_bus::{EventPublisher, IpmcEvent};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

pub struct EventFanout {
    platform_events: PlatformEventSink,
    bus: Arc<dyn EventPublisher>,
    metrics_enabled: bool,
    runtime: Handle,
}

impl EventFanout {
    pub fn new(
        platform_events: PlatformEventSink,
        bus: Arc<dyn EventPublisher>,
        metrics_enabled: bool,
        runtime: Handle,
    ) -> Self {
        Self {
            platform_events,
            bus,
            metrics_enabled,
            runtime,
        }
    }

    fn send_platform_event(&self, event: &HotswapEvent) {
        let mut request = self.platform_events.message(event);
        let pending = match self.platform_events.send(event) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, %event, "Platform event not submitted");
                self.bus.publish(IpmcEvent::DeliveryFailed {
                    request,
                    reason: e.to_string(),
                });
                return;
            }
        };
        request.rq_seq = pending.sequence();

        let bus = Arc::clone(&self.bus);
        self.runtime.spawn(async move {
            match pending.await {
                Ok(reply) if reply.completion_code() == Some(CC_SUCCESS) => {
                    debug!(seq = request.rq_seq, "Platform event acknowledged");
                }
                Ok(reply) => {
                    warn!(
                        seq = request.rq_seq,
                        completion_code = ?reply.completion_code(),
                        "Platform event rejected by event receiver"
                    );
                }
                Err(e) => {
                    warn!(error = %e, seq = request.rq_seq, "Platform event not delivered");
                    bus.publish(IpmcEvent::DeliveryFailed {
                        request,
                        reason: e.to_string(),
                    });
                }
            }
        });
    }
}

impl HotswapEventSink for EventFanout {
    fn publish(&self, event: &HotswapEvent) {
        if self.metrics_enabled {
            ipmc_telemetry::metrics::observe_hotswap(event);
        }
        self.bus.publish(IpmcEvent::HotswapTransition(*event));
        self.send_platform_event(event);
    }
}
