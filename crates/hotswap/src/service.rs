//! Hot-swap controller: the thread-safe owner of one FRU's [`HotswapState`].
//!
//! Inputs take the state lock, compute [`Effect`]s, queue them and release
//! the lock before any effect runs, so the queue is in state order. An
//! input arriving while effects are running (for example a payload that
//! reports completion from inside `begin_activation`) appends its own
//! effects to the queue and returns; the caller already draining the queue
//! runs them next. No lock is ever held across a collaborator call.

use crate::domain::{
    ActivationPolicy, Effect, HandleState, HotswapEvent, HotswapState, MState, Transition,
};
use crate::error::HotswapResult;
use crate::ports::{HotswapApi, HotswapEventSink, PayloadPower};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotswapConfig {
    /// FRU device id reported in events. Only FRU 0 is managed.
    pub fru_id: u8,
}

pub struct HotswapController {
    config: HotswapConfig,
    state: Mutex<HotswapState>,
    pending: Mutex<VecDeque<Effect>>,
    draining: AtomicBool,
    payload: RwLock<Option<Weak<dyn PayloadPower>>>,
    sink: Arc<dyn HotswapEventSink>,
}

impl HotswapController {
    pub fn new(config: HotswapConfig, sink: Arc<dyn HotswapEventSink>) -> Self {
        info!(fru = config.fru_id, "Hot-swap controller initialized in M1");
        Self {
            config,
            state: Mutex::new(HotswapState::new()),
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            payload: RwLock::new(None),
            sink,
        }
    }

    /// Attach the payload power manager. Only a weak reference is kept.
    pub fn attach_payload<P>(&self, payload: &Arc<P>)
    where
        P: PayloadPower + 'static,
    {
        let weak: Weak<dyn PayloadPower> = Arc::downgrade(payload) as Weak<dyn PayloadPower>;
        *self.payload.write() = Some(weak);
    }

    pub fn fru_id(&self) -> u8 {
        self.config.fru_id
    }

    pub fn previous_mstate(&self) -> MState {
        self.state.lock().previous_mstate()
    }

    /// Copy of the full state, for diagnostics.
    pub fn snapshot(&self) -> HotswapState {
        self.state.lock().clone()
    }

    pub fn physical_handle(&self) -> Option<HandleState> {
        self.state.lock().physical_handle()
    }

    pub fn override_handle(&self) -> Option<HandleState> {
        self.state.lock().override_handle()
    }

    pub fn effective_handle(&self) -> Option<HandleState> {
        self.state.lock().effective_handle()
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Hardware report of the handle position.
    pub fn set_physical_handle(&self, handle: HandleState) {
        debug!(?handle, "Physical handle report");
        self.apply(|state| state.set_physical_handle(handle));
    }

    /// Operator override of the handle position; `None` releases it.
    pub fn set_override_handle(&self, handle: Option<HandleState>) {
        debug!(?handle, "Handle override");
        self.apply(|state| state.set_override_handle(handle));
    }

    pub fn set_fault_lock(&self, locked: bool) {
        self.apply(|state| state.set_fault_lock(locked));
    }

    pub fn set_update_lock(&self, locked: bool) -> HotswapResult<()> {
        {
            let mut state = self.state.lock();
            let effects = state.set_update_lock(locked)?;
            self.pending.lock().extend(effects);
        }
        self.drain();
        Ok(())
    }

    pub fn payload_activation_complete(&self) {
        self.apply(HotswapState::payload_activation_complete);
    }

    pub fn payload_deactivation_complete(&self) {
        self.apply(HotswapState::payload_deactivation_complete);
    }

    fn apply<F>(&self, input: F)
    where
        F: FnOnce(&mut HotswapState) -> Vec<Effect>,
    {
        {
            let mut state = self.state.lock();
            let effects = input(&mut *state);
            self.pending.lock().extend(effects);
        }
        self.drain();
    }

    // =========================================================================
    // Effects
    // =========================================================================

    fn drain(&self) {
        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                // Already draining, up the stack or on another thread.
                return;
            }
            loop {
                let next = self.pending.lock().pop_front();
                match next {
                    Some(effect) => self.perform(effect),
                    None => break,
                }
            }
            self.draining.store(false, Ordering::Release);
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn perform(&self, effect: Effect) {
        match effect {
            Effect::Notify(transition) => {
                info!(
                    fru = self.config.fru_id,
                    from = %transition.from,
                    to = %transition.to,
                    reason = ?transition.reason,
                    "Transitioned to {}", transition.to
                );
                self.publish(transition);
            }
            Effect::Rearm(transition) => {
                debug!(mstate = %transition.to, "Hot-swap sensor rearmed");
                self.publish(transition);
            }
            Effect::BeginActivation => match self.payload() {
                Some(payload) => payload.begin_activation(),
                None => warn!("No payload attached, activation will not complete"),
            },
            Effect::DeactivatePayload => match self.payload() {
                Some(payload) => payload.deactivate(),
                None => warn!("No payload attached, deactivation will not complete"),
            },
        }
    }

    fn publish(&self, transition: Transition) {
        self.sink
            .publish(&HotswapEvent::from_transition(self.config.fru_id, transition));
    }

    fn payload(&self) -> Option<Arc<dyn PayloadPower>> {
        self.payload.read().as_ref().and_then(Weak::upgrade)
    }
}

impl HotswapApi for HotswapController {
    fn mstate(&self) -> MState {
        self.state.lock().mstate()
    }

    fn activate(&self) {
        self.apply(HotswapState::activate);
    }

    fn deactivate(&self) {
        self.apply(HotswapState::deactivate);
    }

    fn activation_policy(&self) -> ActivationPolicy {
        self.state.lock().policy()
    }

    fn set_activation_lock(&self, activation: bool, deactivation: bool) {
        self.apply(|state| state.set_activation_lock(activation, deactivation));
    }
}
