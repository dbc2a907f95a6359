//! # Command Dispatch
//!
//! Maps `(netfn, cmd)` to a handler. Requests are dispatched on the
//! transport worker, so a handler must return promptly: while it runs, no
//! retries are sent and no frames are read.
//!
//! Lookups clone the handler out of the table before calling it, so a
//! handler may itself register or unregister commands.

use crate::domain::completion::CC_INVALID_COMMAND;
use crate::domain::{BusId, Message};
use crate::ports::IpmbApi;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// A validated inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRequest {
    pub message: Message,
    /// Bus it arrived on; `None` for loopback.
    pub bus: Option<BusId>,
    /// Same sender, command and sequence seen inside the duplicate window
    /// and no reply was cached for it.
    pub duplicate: bool,
}

pub trait CommandHandler: Send + Sync {
    fn handle(&self, ipmb: &dyn IpmbApi, request: &InboundRequest);
}

impl<F> CommandHandler for F
where
    F: Fn(&dyn IpmbApi, &InboundRequest) + Send + Sync,
{
    fn handle(&self, ipmb: &dyn IpmbApi, request: &InboundRequest) {
        self(ipmb, request)
    }
}

/// Answers any request with "Invalid Command".
///
/// Broadcast requests are not answered.
#[derive(Clone, Copy, Debug, Default)]
pub struct InvalidCommandHandler;

impl CommandHandler for InvalidCommandHandler {
    fn handle(&self, ipmb: &dyn IpmbApi, request: &InboundRequest) {
        let msg = &request.message;
        if msg.is_response() || msg.broadcast {
            return;
        }
        debug!(%msg, "Unsupported command");
        if let Err(e) = ipmb.send_response(msg.prepare_reply(vec![CC_INVALID_COMMAND])) {
            debug!(error = %e, "Could not queue Invalid Command reply");
        }
    }
}

/// Where a dispatched request ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Defaulted,
    Dropped,
}

#[derive(Default)]
pub struct CommandDispatchTable {
    handlers: RwLock<HashMap<(u8, u8), Arc<dyn CommandHandler>>>,
    default_handler: RwLock<Option<Arc<dyn CommandHandler>>>,
}

impl CommandDispatchTable {
    /// Empty table; unknown commands are dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table answering unknown commands with "Invalid Command".
    pub fn with_invalid_command_default() -> Self {
        let table = Self::new();
        table.set_default_handler(Some(Arc::new(InvalidCommandHandler)));
        table
    }

    /// Install a handler. Returns `true` if it replaced an existing one.
    pub fn register_handler<H>(&self, net_fn: u8, cmd: u8, handler: H) -> bool
    where
        H: CommandHandler + 'static,
    {
        debug!(
            net_fn = %format!("{net_fn:#04x}"),
            cmd = %format!("{cmd:#04x}"),
            "Registering command handler"
        );
        self.handlers
            .write()
            .insert((net_fn, cmd), Arc::new(handler))
            .is_some()
    }

    /// Remove a handler. Returns `true` if one was registered.
    pub fn unregister_handler(&self, net_fn: u8, cmd: u8) -> bool {
        self.handlers.write().remove(&(net_fn, cmd)).is_some()
    }

    pub fn set_default_handler(&self, handler: Option<Arc<dyn CommandHandler>>) {
        *self.default_handler.write() = handler;
    }

    pub fn is_registered(&self, net_fn: u8, cmd: u8) -> bool {
        self.handlers.read().contains_key(&(net_fn, cmd))
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Route a request to its handler, the default handler, or nowhere.
    pub fn dispatch(&self, ipmb: &dyn IpmbApi, request: &InboundRequest) -> DispatchOutcome {
        let key = (request.message.net_fn, request.message.cmd);
        let handler = self.handlers.read().get(&key).cloned();
        if let Some(handler) = handler {
            handler.handle(ipmb, request);
            return DispatchOutcome::Handled;
        }

        let fallback = self.default_handler.read().clone();
        match fallback {
            Some(handler) => {
                handler.handle(ipmb, request);
                DispatchOutcome::Defaulted
            }
            None => {
                trace!(msg = %request.message, "No handler, request dropped");
                DispatchOutcome::Dropped
            }
        }
    }
}
