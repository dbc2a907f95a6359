//! # M-State Machine
//!
//! Pure transition logic. Every input mutates [`HotswapState`] and returns
//! the [`Effect`]s the caller must carry out, in order. Nothing here calls
//! out, so the caller decides when (and outside which locks) the payload is
//! told to power up or down.
//!
//! ```text
//!  [M1] ──handle closed──→ [M2] ──activate──→ [M3] ──payload ready──→ [M4]
//!   ↑  ←───handle open───                      │                      │  ↑
//!   │                                          │ handle open          │  │ activate
//!   │                                          │ or deactivate        ↓  │
//!   │                                          ↓         handle open [M5]
//!   └──deactivation complete────────────────[M6] ←──deactivate────────┘
//! ```
//!
//! M7 is entered only by the shelf's view of the FRU and is inert here.

use super::mstate::{HandleState, MState, TransitionReason};
use crate::error::{HotswapError, HotswapResult};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A committed state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: MState,
    pub to: MState,
    pub reason: TransitionReason,
}

/// Work the owner of the state must perform after an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Announce a transition.
    Notify(Transition),
    /// Re-announce the current state after the sensor was rearmed.
    Rearm(Transition),
    /// Start payload power-up and E-Keying negotiation.
    BeginActivation,
    /// Shut the payload down.
    DeactivatePayload,
}

/// Shelf request carried into a reevaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationRequest {
    None,
    Activate,
    Deactivate,
}

/// Activation and deactivation lock bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationPolicy {
    pub activation_locked: bool,
    pub deactivation_locked: bool,
}

impl ActivationPolicy {
    /// Bit 0 activation locked, bit 1 deactivation locked.
    pub fn bits(self) -> u8 {
        u8::from(self.activation_locked) | (u8::from(self.deactivation_locked) << 1)
    }
}

/// Hot-swap state of one FRU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HotswapState {
    mstate: MState,
    last: Transition,
    activation_locked: bool,
    deactivation_locked: bool,
    /// Held until the first physical handle report.
    startup_locked: bool,
    fault_locked: bool,
    update_locked: bool,
    physical_handle: Option<HandleState>,
    override_handle: Option<HandleState>,
    /// Payload reported power-up complete while in M3.
    payload_ready: bool,
    /// Payload already told to shut down for the current M6 visit.
    deactivation_signalled: bool,
}

impl Default for HotswapState {
    fn default() -> Self {
        Self::new()
    }
}

impl HotswapState {
    /// Installed, inactive, handle position not yet known.
    pub fn new() -> Self {
        Self {
            mstate: MState::M1,
            last: Transition {
                from: MState::M1,
                to: MState::M1,
                reason: TransitionReason::Normal,
            },
            activation_locked: false,
            deactivation_locked: false,
            startup_locked: true,
            fault_locked: false,
            update_locked: false,
            physical_handle: None,
            override_handle: None,
            payload_ready: false,
            deactivation_signalled: false,
        }
    }

    pub fn mstate(&self) -> MState {
        self.mstate
    }

    pub fn previous_mstate(&self) -> MState {
        self.last.from
    }

    /// Most recent transition (or the initial state if none happened yet).
    pub fn last_transition(&self) -> Transition {
        self.last
    }

    pub fn policy(&self) -> ActivationPolicy {
        ActivationPolicy {
            activation_locked: self.activation_locked,
            deactivation_locked: self.deactivation_locked,
        }
    }

    pub fn is_startup_locked(&self) -> bool {
        self.startup_locked
    }

    pub fn is_fault_locked(&self) -> bool {
        self.fault_locked
    }

    pub fn is_update_locked(&self) -> bool {
        self.update_locked
    }

    pub fn physical_handle(&self) -> Option<HandleState> {
        self.physical_handle
    }

    pub fn override_handle(&self) -> Option<HandleState> {
        self.override_handle
    }

    /// Override if set, else the physical position.
    pub fn effective_handle(&self) -> Option<HandleState> {
        self.override_handle.or(self.physical_handle)
    }

    /// No lock currently forbids leaving M1.
    pub fn activation_permitted(&self) -> bool {
        !self.activation_locked && !self.startup_locked && !self.fault_locked && !self.update_locked
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    pub fn set_physical_handle(&mut self, handle: HandleState) -> Vec<Effect> {
        // Before the first report the handle counts as open.
        let previous = self.effective_handle().or(Some(HandleState::Open));
        self.physical_handle = Some(handle);

        let mut effects = Vec::new();
        if self.startup_locked {
            self.startup_locked = false;
            effects.push(Effect::Rearm(self.last));
        }
        self.clear_fault_lock_if_open();
        effects.extend(self.reevaluate(ActivationRequest::None, previous));
        effects
    }

    pub fn set_override_handle(&mut self, handle: Option<HandleState>) -> Vec<Effect> {
        let previous = self.effective_handle();
        self.override_handle = handle;
        self.clear_fault_lock_if_open();
        self.reevaluate(ActivationRequest::None, previous)
    }

    pub fn activate(&mut self) -> Vec<Effect> {
        self.reevaluate(ActivationRequest::Activate, self.effective_handle())
    }

    pub fn deactivate(&mut self) -> Vec<Effect> {
        self.reevaluate(ActivationRequest::Deactivate, self.effective_handle())
    }

    pub fn set_activation_lock(&mut self, activation: bool, deactivation: bool) -> Vec<Effect> {
        self.activation_locked = activation;
        self.deactivation_locked = deactivation;
        self.reevaluate(ActivationRequest::None, self.effective_handle())
    }

    pub fn set_fault_lock(&mut self, locked: bool) -> Vec<Effect> {
        self.fault_locked = locked;
        self.reevaluate(ActivationRequest::None, self.effective_handle())
    }

    /// Take or release the update lock. Taking it is only allowed in M1.
    pub fn set_update_lock(&mut self, locked: bool) -> HotswapResult<Vec<Effect>> {
        if locked && self.mstate != MState::M1 {
            return Err(HotswapError::UpdateLockRejected {
                mstate: self.mstate,
            });
        }
        self.update_locked = locked;
        Ok(self.reevaluate(ActivationRequest::None, self.effective_handle()))
    }

    /// Payload finished powering up. Only meaningful once per M3 visit.
    pub fn payload_activation_complete(&mut self) -> Vec<Effect> {
        if self.mstate != MState::M3 || self.payload_ready {
            return Vec::new();
        }
        self.payload_ready = true;
        self.reevaluate(ActivationRequest::None, self.effective_handle())
    }

    /// Payload finished powering down.
    pub fn payload_deactivation_complete(&mut self) -> Vec<Effect> {
        if self.mstate != MState::M6 {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.transition(MState::M1, TransitionReason::Normal, &mut effects);
        effects
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Drive the state as far as the current inputs allow.
    ///
    /// `previous_handle` is the effective handle before this input; a change
    /// clears the lock on the opposite direction and is reported as an
    /// operator action.
    fn reevaluate(
        &mut self,
        request: ActivationRequest,
        previous_handle: Option<HandleState>,
    ) -> Vec<Effect> {
        let handle = self.effective_handle();
        match (previous_handle, handle) {
            (Some(HandleState::Open), Some(HandleState::Closed)) => self.activation_locked = false,
            (Some(HandleState::Closed), Some(HandleState::Open)) => self.deactivation_locked = false,
            _ => {}
        }

        let mut effects = Vec::new();
        let mut request = request;
        let mut handle_moved = previous_handle.is_some() && previous_handle != handle;
        while self.step(request, handle, handle_moved, &mut effects) {
            // Follow-on steps see neither the request nor the handle edge.
            request = ActivationRequest::None;
            handle_moved = false;
        }
        effects
    }

    /// Take at most one transition. Returns whether the new state must be
    /// evaluated again.
    fn step(
        &mut self,
        request: ActivationRequest,
        handle: Option<HandleState>,
        handle_moved: bool,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let open = handle == Some(HandleState::Open);
        let closed = handle == Some(HandleState::Closed);
        let switch_reason = if handle_moved {
            TransitionReason::OperatorSwitch
        } else {
            TransitionReason::Normal
        };

        let next = match self.mstate {
            MState::M1 if closed && self.activation_permitted() => Some((MState::M2, switch_reason)),
            MState::M2 if open => Some((MState::M1, switch_reason)),
            MState::M2 if request == ActivationRequest::Activate => {
                Some((MState::M3, TransitionReason::CommandedByShelf))
            }
            MState::M3 if open => {
                let reason = if handle_moved {
                    TransitionReason::OperatorSwitch
                } else if request == ActivationRequest::Deactivate {
                    TransitionReason::CommandedByShelf
                } else {
                    TransitionReason::FruProgrammatic
                };
                Some((MState::M6, reason))
            }
            MState::M3 if request == ActivationRequest::Deactivate => {
                Some((MState::M6, TransitionReason::CommandedByShelf))
            }
            MState::M3 if self.payload_ready && !self.activation_locked => {
                Some((MState::M4, TransitionReason::Normal))
            }
            MState::M4 if open && !self.deactivation_locked => Some((MState::M5, switch_reason)),
            MState::M4 | MState::M5 if request == ActivationRequest::Deactivate => {
                Some((MState::M6, TransitionReason::CommandedByShelf))
            }
            MState::M5 if request == ActivationRequest::Activate && !self.activation_locked => {
                Some((MState::M4, TransitionReason::CommandedByShelf))
            }
            _ => None,
        };

        match next {
            Some((to, reason)) => {
                self.transition(to, reason, effects);
                matches!(to, MState::M3 | MState::M6)
            }
            None => {
                trace!(mstate = %self.mstate, ?request, ?handle, "No transition");
                false
            }
        }
    }

    fn transition(&mut self, to: MState, reason: TransitionReason, effects: &mut Vec<Effect>) {
        let from = self.mstate;
        if to == MState::M6 && !self.deactivation_signalled {
            // The payload hears about the shutdown before anyone sees M6.
            self.deactivation_signalled = true;
            effects.push(Effect::DeactivatePayload);
        }

        self.mstate = to;
        self.last = Transition { from, to, reason };
        effects.push(Effect::Notify(self.last));

        match to {
            MState::M1 => self.deactivation_signalled = false,
            MState::M3 => {
                self.payload_ready = false;
                effects.push(Effect::BeginActivation);
            }
            MState::M6 => self.payload_ready = false,
            _ => {}
        }
    }

    fn clear_fault_lock_if_open(&mut self) {
        if self.effective_handle() == Some(HandleState::Open) {
            self.fault_locked = false;
        }
    }
}
