//! Driven ports (SPI) called by the hot-swap controller.
//!
//! Both are invoked outside the state lock, so implementations may call
//! straight back into the controller.

use crate::domain::HotswapEvent;

/// Payload power manager.
pub trait PayloadPower: Send + Sync {
    /// Begin power-up and E-Keying. Report the result with
    /// `payload_activation_complete`.
    fn begin_activation(&self);

    /// Shut the payload down. Report the result with
    /// `payload_deactivation_complete`.
    fn deactivate(&self);
}

/// Destination for hot-swap sensor events.
pub trait HotswapEventSink: Send + Sync {
    fn publish(&self, event: &HotswapEvent);
}
