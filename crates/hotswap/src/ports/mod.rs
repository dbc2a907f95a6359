//! Ports: shelf-facing API above the state machine, payload and event
//! sink below it.

pub mod inbound;
pub mod outbound;

pub use inbound::HotswapApi;
pub use outbound::{HotswapEventSink, PayloadPower};
