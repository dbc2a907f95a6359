//! Ports: the driver seam below the transport and the API above it.

pub mod inbound;
pub mod outbound;

pub use inbound::{IpmbApi, PendingReply};
pub use outbound::IpmbDriver;
