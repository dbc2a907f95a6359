//! # IPMB Transport
//!
//! IPMI message transport over a redundant pair of Intelligent Platform
//! Management Buses.
//!
//! ## Architecture
//!
//! ```text
//!  [callers] ──send_request / send_response──→ IpmbHandle
//!                                                  │ enqueue
//!                                                  ↓
//!  [driver A] ──FrameSink──→ ┌──────────────── IpmbService (worker) ──────────┐
//!  [driver B] ──FrameSink──→ │ MessageCodec · SequenceTracker · RetryQueue    │
//!                            │ CommandDispatchTable ──→ handlers              │
//!                            └──────── DualBusTransport ──→ driver A | B ─────┘
//! ```
//!
//! - **Domain:** wire codec, bus selection, sequence tables, retry queue.
//! - **Ports:** [`IpmbDriver`] below, [`IpmbApi`] above.
//! - **Service:** the worker that owns the queue and the buses.
//!
//! ## Delivery Guarantees
//!
//! - Each request is attempted at most `max_retries + 1` times, alternating
//!   buses, and its [`PendingReply`] resolves exactly once.
//! - Responses are transmitted once and retried only on transmit failure.
//! - With both buses disabled, submission fails before anything is queued.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod events;
pub mod ports;
pub mod service;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::IpmbConfig;
pub use dispatch::{CommandDispatchTable, CommandHandler, DispatchOutcome, InboundRequest};
pub use domain::*;
pub use events::{ChecksumSpan, CodecError, DeliveryError, TransportError};
pub use ports::{IpmbApi, IpmbDriver, PendingReply};
pub use service::{IpmbHandle, IpmbService};
pub use transport::{BusControls, DualBusTransport, FrameSink, ReceivedFrame};
