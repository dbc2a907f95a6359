//! Error types for the hot-swap subsystem.

use crate::domain::MState;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HotswapError {
    /// Raw value does not name an M-state.
    #[error("M{0} is not a hot-swap state (expected M1..M7)")]
    InvalidMState(u8),

    /// The update lock can only be taken while the FRU is inactive.
    #[error("Update lock rejected in {mstate}")]
    UpdateLockRejected { mstate: MState },

    /// Event data does not carry the hot-swap event marker.
    #[error("Not a hot-swap event: first byte {0:#04x}")]
    NotAHotswapEvent(u8),
}

/// Result type for hot-swap operations
pub type HotswapResult<T> = Result<T, HotswapError>;
