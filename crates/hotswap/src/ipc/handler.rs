//! PICMG command handlers for the hot-swap subsystem.
//!
//! | Command | NetFn | Cmd | Request data |
//! |---------|-------|-----|--------------|
//! | Set FRU Activation Policy | 0x2C | 0x0A | id, FRU, mask, bits |
//! | Get FRU Activation Policy | 0x2C | 0x0B | id, FRU |
//! | Set FRU Activation | 0x2C | 0x0C | id, FRU, 0=deactivate / 1=activate |
//!
//! Every reply starts with the completion code followed by the PICMG
//! identifier. Only FRU 0 exists.

use crate::ports::HotswapApi;
use ipmb_transport::domain::completion::{
    CC_INVALID_DATA_FIELD, CC_PARAMETER_OUT_OF_RANGE, CC_SUCCESS, NETFN_GROUP_EXTENSION,
};
use ipmb_transport::{CommandDispatchTable, CommandHandler, InboundRequest, IpmbApi};
use std::sync::Arc;
use tracing::debug;

/// Defining body identifier for PICMG commands.
pub const PICMG_IDENTIFIER: u8 = 0x00;

pub const CMD_SET_FRU_ACTIVATION_POLICY: u8 = 0x0A;
pub const CMD_GET_FRU_ACTIVATION_POLICY: u8 = 0x0B;
pub const CMD_SET_FRU_ACTIVATION: u8 = 0x0C;

const FRU_ACTIVATION_DEACTIVATE: u8 = 0x00;
const FRU_ACTIVATION_ACTIVATE: u8 = 0x01;

const POLICY_ACTIVATION_LOCK: u8 = 0x01;
const POLICY_DEACTIVATION_LOCK: u8 = 0x02;

/// Answers the PICMG FRU activation commands against a [`HotswapApi`].
pub struct PicmgHandler<H>
where
    H: HotswapApi,
{
    hotswap: Arc<H>,
}

impl<H> PicmgHandler<H>
where
    H: HotswapApi + 'static,
{
    pub fn new(hotswap: Arc<H>) -> Self {
        Self { hotswap }
    }

    /// Register this handler for each command it answers.
    pub fn register(self, table: &CommandDispatchTable) {
        let handler = Arc::new(self);
        for cmd in [
            CMD_SET_FRU_ACTIVATION_POLICY,
            CMD_GET_FRU_ACTIVATION_POLICY,
            CMD_SET_FRU_ACTIVATION,
        ] {
            let handler = Arc::clone(&handler);
            table.register_handler(
                NETFN_GROUP_EXTENSION,
                cmd,
                move |ipmb: &dyn IpmbApi, request: &InboundRequest| handler.handle(ipmb, request),
            );
        }
    }

    /// Compute the reply data for a request.
    pub fn respond(&self, request: &InboundRequest) -> Vec<u8> {
        let data = &request.message.data;
        if data.first() != Some(&PICMG_IDENTIFIER) {
            return vec![CC_INVALID_DATA_FIELD];
        }

        match request.message.cmd {
            CMD_SET_FRU_ACTIVATION_POLICY => match data.as_slice() {
                [_, 0, mask, bits] => {
                    if !request.duplicate {
                        self.set_policy(*mask, *bits);
                    }
                    vec![CC_SUCCESS, PICMG_IDENTIFIER]
                }
                _ => vec![CC_PARAMETER_OUT_OF_RANGE],
            },
            CMD_GET_FRU_ACTIVATION_POLICY => match data.as_slice() {
                [_, 0] => vec![
                    CC_SUCCESS,
                    PICMG_IDENTIFIER,
                    self.hotswap.activation_policy().bits(),
                ],
                _ => vec![CC_PARAMETER_OUT_OF_RANGE],
            },
            CMD_SET_FRU_ACTIVATION => match data.as_slice() {
                [_, 0, command @ (FRU_ACTIVATION_DEACTIVATE | FRU_ACTIVATION_ACTIVATE)] => {
                    if request.duplicate {
                        debug!("Repeated Set FRU Activation, not re-applied");
                    } else if *command == FRU_ACTIVATION_ACTIVATE {
                        self.hotswap.activate();
                    } else {
                        self.hotswap.deactivate();
                    }
                    vec![CC_SUCCESS, PICMG_IDENTIFIER]
                }
                _ => vec![CC_PARAMETER_OUT_OF_RANGE],
            },
            _ => vec![CC_INVALID_DATA_FIELD],
        }
    }

    /// Apply the masked lock bits, keeping the unmasked ones.
    fn set_policy(&self, mask: u8, bits: u8) {
        let mut policy = self.hotswap.activation_policy();
        if mask & POLICY_ACTIVATION_LOCK != 0 {
            policy.activation_locked = bits & POLICY_ACTIVATION_LOCK != 0;
        }
        if mask & POLICY_DEACTIVATION_LOCK != 0 {
            policy.deactivation_locked = bits & POLICY_DEACTIVATION_LOCK != 0;
        }
        self.hotswap
            .set_activation_lock(policy.activation_locked, policy.deactivation_locked);
    }
}

impl<H> CommandHandler for PicmgHandler<H>
where
    H: HotswapApi + 'static,
{
    fn handle(&self, ipmb: &dyn IpmbApi, request: &InboundRequest) {
        let msg = &request.message;
        if msg.is_response() || msg.broadcast {
            return;
        }
        let reply = msg.prepare_reply(self.respond(request));
        if let Err(e) = ipmb.send_response(reply) {
            debug!(error = %e, cmd = msg.cmd, "Could not queue PICMG reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivationPolicy, MState};
    use ipmb_transport::Message;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeHotswap {
        policy: Mutex<ActivationPolicy>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl HotswapApi for FakeHotswap {
        fn mstate(&self) -> MState {
            MState::M1
        }

        fn activate(&self) {
            self.calls.lock().push("activate");
        }

        fn deactivate(&self) {
            self.calls.lock().push("deactivate");
        }

        fn activation_policy(&self) -> ActivationPolicy {
            *self.policy.lock()
        }

        fn set_activation_lock(&self, activation: bool, deactivation: bool) {
            *self.policy.lock() = ActivationPolicy {
                activation_locked: activation,
                deactivation_locked: deactivation,
            };
        }
    }

    fn request(cmd: u8, data: Vec<u8>) -> InboundRequest {
        InboundRequest {
            message: Message::request(0x20, 0x72, NETFN_GROUP_EXTENSION, cmd, data),
            bus: None,
            duplicate: false,
        }
    }

    fn handler() -> (PicmgHandler<FakeHotswap>, Arc<FakeHotswap>) {
        let hotswap = Arc::new(FakeHotswap::default());
        (PicmgHandler::new(Arc::clone(&hotswap)), hotswap)
    }

    #[test]
    fn test_set_fru_activation() {
        let (handler, hotswap) = handler();
        assert_eq!(
            handler.respond(&request(CMD_SET_FRU_ACTIVATION, vec![0, 0, 1])),
            vec![0x00, 0x00]
        );
        handler.respond(&request(CMD_SET_FRU_ACTIVATION, vec![0, 0, 0]));
        assert_eq!(*hotswap.calls.lock(), vec!["activate", "deactivate"]);
    }

    #[test]
    fn test_set_fru_activation_rejects_bad_input() {
        let (handler, hotswap) = handler();
        assert_eq!(
            handler.respond(&request(CMD_SET_FRU_ACTIVATION, vec![0, 0, 2])),
            vec![CC_PARAMETER_OUT_OF_RANGE]
        );
        assert_eq!(
            handler.respond(&request(CMD_SET_FRU_ACTIVATION, vec![0, 1, 1])),
            vec![CC_PARAMETER_OUT_OF_RANGE]
        );
        assert_eq!(
            handler.respond(&request(CMD_SET_FRU_ACTIVATION, vec![0, 0])),
            vec![CC_PARAMETER_OUT_OF_RANGE]
        );
        assert_eq!(
            handler.respond(&request(CMD_SET_FRU_ACTIVATION, vec![3, 0, 1])),
            vec![CC_INVALID_DATA_FIELD]
        );
        assert_eq!(
            handler.respond(&request(CMD_SET_FRU_ACTIVATION, vec![])),
            vec![CC_INVALID_DATA_FIELD]
        );
        assert!(hotswap.calls.lock().is_empty());
    }

    #[test]
    fn test_duplicate_activation_is_not_reapplied() {
        let (handler, hotswap) = handler();
        let mut repeated = request(CMD_SET_FRU_ACTIVATION, vec![0, 0, 1]);
        repeated.duplicate = true;
        assert_eq!(handler.respond(&repeated), vec![0x00, 0x00]);
        assert!(hotswap.calls.lock().is_empty());
    }

    #[test]
    fn test_activation_policy_mask() {
        let (handler, hotswap) = handler();
        handler.respond(&request(CMD_SET_FRU_ACTIVATION_POLICY, vec![0, 0, 0x03, 0x03]));
        assert_eq!(hotswap.activation_policy().bits(), 0x03);

        // Only the deactivation lock is masked in.
        handler.respond(&request(CMD_SET_FRU_ACTIVATION_POLICY, vec![0, 0, 0x02, 0x00]));
        assert_eq!(
            handler.respond(&request(CMD_GET_FRU_ACTIVATION_POLICY, vec![0, 0])),
            vec![0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_registers_into_dispatch_table() {
        let (handler, _) = handler();
        let table = CommandDispatchTable::new();
        handler.register(&table);
        assert_eq!(table.len(), 3);
        assert!(table.is_registered(NETFN_GROUP_EXTENSION, CMD_SET_FRU_ACTIVATION));
    }
}
