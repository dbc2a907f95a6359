//! Inbound ports (API) exposed by the transport.

use crate::domain::{DeliveryResult, Message};
use crate::events::DeliveryError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Client-side API of the transport.
pub trait IpmbApi: Send + Sync {
    /// IPMB address of this node.
    fn local_address(&self) -> u8;

    /// Submit a request. The returned future resolves exactly once, with the
    /// matching reply or the reason delivery failed.
    fn send_request(&self, msg: Message) -> Result<PendingReply, DeliveryError>;

    /// Submit a response. Responses are transmitted once; failures are
    /// retried in the background and counted, never reported to the caller.
    fn send_response(&self, msg: Message) -> Result<(), DeliveryError>;
}

/// Completion of a submitted request.
#[derive(Debug)]
pub struct PendingReply {
    seq: u8,
    rx: oneshot::Receiver<DeliveryResult>,
}

impl PendingReply {
    pub fn new(seq: u8, rx: oneshot::Receiver<DeliveryResult>) -> Self {
        Self { seq, rx }
    }

    /// Sequence number assigned to the request.
    pub fn sequence(&self) -> u8 {
        self.seq
    }
}

impl Future for PendingReply {
    type Output = DeliveryResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the worker went away without completing.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(DeliveryError::Shutdown)))
    }
}
