//! # IPMC Bus
//!
//! In-process event bus that lets the IPMC subsystems observe each other
//! without direct calls.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────────┐   subscribe()   ┌──────────────┐
//! │  Hot-swap    │ ────────────→ │ InMemoryEventBus │ ←────────────── │  Telemetry   │
//! │  Transport   │               │   (broadcast)    │ ──────────────→ │  Runtime     │
//! └──────────────┘               └──────────────────┘   IpmcEvent     └──────────────┘
//! ```
//!
//! Each subscriber owns a bounded slot in the broadcast ring. A subscriber
//! that falls behind by more than the capacity loses the oldest events and
//! is told how many it missed.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, IpmcEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
