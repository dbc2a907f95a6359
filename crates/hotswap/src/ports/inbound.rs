//! Driving port used by shelf command handlers.

use crate::domain::{ActivationPolicy, MState};

/// Shelf-facing hot-swap operations.
pub trait HotswapApi: Send + Sync {
    /// Current M-state.
    fn mstate(&self) -> MState;

    /// Current M-state as its PICMG number.
    fn get_mstate(&self) -> u8 {
        self.mstate().as_u8()
    }

    /// Set FRU Activation (activate).
    fn activate(&self);

    /// Set FRU Activation (deactivate).
    fn deactivate(&self);

    fn activation_policy(&self) -> ActivationPolicy;

    fn set_activation_lock(&self, activation: bool, deactivation: bool);
}
