//! Adapters for the driven ports.

pub mod platform_event;

pub use platform_event::PlatformEventSink;
