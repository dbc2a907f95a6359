//! Outbound ports (SPI) for the transport.

use async_trait::async_trait;

/// A physical IPMB driver.
///
/// Receive is push-based: the driver hands frames to the
/// [`FrameSink`](crate::transport::FrameSink) it was given when the
/// transport was built, typically from its interrupt path.
#[async_trait]
pub trait IpmbDriver: Send + Sync {
    /// Transmit one encoded frame. Returns `true` when the bus accepted it.
    async fn send_frame(&self, frame: &[u8]) -> bool;
}
