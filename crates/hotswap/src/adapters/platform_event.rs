//! Reports hot-swap events to the shelf as Platform Event Messages.

use crate::domain::event::CMD_PLATFORM_EVENT;
use crate::domain::HotswapEvent;
use crate::ports::HotswapEventSink;
use ipmb_transport::domain::completion::NETFN_SENSOR_EVENT;
use ipmb_transport::{DeliveryError, IpmbApi, Message, PendingReply};
use std::sync::Arc;
use tracing::warn;

/// Default event receiver: the shelf manager.
pub const DEFAULT_EVENT_RECEIVER: u8 = 0x20;

pub struct PlatformEventSink {
    ipmb: Arc<dyn IpmbApi>,
    event_receiver: u8,
    sensor_number: u8,
}

impl PlatformEventSink {
    pub fn new(ipmb: Arc<dyn IpmbApi>, event_receiver: u8, sensor_number: u8) -> Self {
        Self {
            ipmb,
            event_receiver,
            sensor_number,
        }
    }

    /// The Platform Event Message carrying `event`.
    pub fn message(&self, event: &HotswapEvent) -> Message {
        Message::request(
            self.ipmb.local_address(),
            self.event_receiver,
            NETFN_SENSOR_EVENT,
            CMD_PLATFORM_EVENT,
            event.platform_event_data(self.sensor_number),
        )
    }

    /// Submit the event; the caller decides whether to await delivery.
    pub fn send(&self, event: &HotswapEvent) -> Result<PendingReply, DeliveryError> {
        self.ipmb.send_request(self.message(event))
    }
}

impl HotswapEventSink for PlatformEventSink {
    fn publish(&self, event: &HotswapEvent) {
        // Delivery runs in the background; failures show in transport stats.
        if let Err(e) = self.send(event) {
            warn!(error = %e, %event, "Hot-swap event not sent");
        }
    }
}
