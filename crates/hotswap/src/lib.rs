//! # Hot-swap
//!
//! PICMG 3.0 hot-swap state machine for the FRU managed by this IPMC.
//!
//! ## Architecture
//!
//! ```text
//!  shelf ──Set FRU Activation (Policy)──→ PicmgHandler ──HotswapApi──┐
//!  handle switch ──set_physical_handle────────────────────────────────┤
//!  payload ──payload_*_complete───────────────────────────────────────┤
//!                                                                     ↓
//!                                                          HotswapController
//!                                                           │  HotswapState (pure)
//!                                    ┌──────────────────────┴──────────────┐
//!                                    ↓                                     ↓
//!                          PayloadPower (weak ref)           HotswapEventSink
//!                          begin_activation / deactivate     → Platform Event Message
//! ```
//!
//! ## Guarantees
//!
//! - M4 is never entered while the activation lock is set.
//! - The payload is told to deactivate before M6 is announced.
//! - Collaborators are called with no lock held and may call back in.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ipc;
pub mod ports;
pub mod service;

pub use adapters::PlatformEventSink;
pub use domain::{
    ActivationPolicy, Effect, HandleState, HotswapEvent, HotswapState, MState, Transition,
    TransitionReason,
};
pub use error::{HotswapError, HotswapResult};
pub use ipc::PicmgHandler;
pub use ports::{HotswapApi, HotswapEventSink, PayloadPower};
pub use service::{HotswapConfig, HotswapController};
