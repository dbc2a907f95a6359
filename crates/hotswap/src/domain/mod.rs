//! Domain layer for the hot-swap subsystem.
//!
//! Pure state and encoding; no I/O, no locks.

pub mod event;
pub mod machine;
pub mod mstate;

pub use event::HotswapEvent;
pub use machine::{ActivationPolicy, ActivationRequest, Effect, HotswapState, Transition};
pub use mstate::{HandleState, MState, TransitionReason};
