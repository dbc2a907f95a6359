//! # IPMB Service
//!
//! One worker task per interface. It owns the [`DualBusTransport`] and the
//! [`RetryQueue`] and is the only place either is touched.
//!
//! ```text
//!                 ┌─────────────────── worker loop ───────────────────┐
//!  IpmbHandle ───→│ submissions ─┐                                    │
//!  FrameSink A ──→│ frames A ────┼─→ wake ─→ decode ─→ match reply    │
//!  FrameSink B ──→│ frames B ────┤             │    └─→ dispatch      │
//!                 │ retry timer ─┘             └─→ process due ─→ bus │
//!                 └───────────────────────────────────────────────────┘
//! ```
//!
//! Submission only enqueues; it never waits for the bus. Frames are served
//! before submissions and submissions before retries.
//!
//! There is no early cancellation: a submitted request stays queued until it
//! is answered, exhausts its retries, or the worker shuts down. Dropping the
//! [`PendingReply`] only discards the outcome.

use crate::config::IpmbConfig;
use crate::dispatch::{CommandDispatchTable, CommandHandler, InboundRequest};
use crate::domain::{
    BusId, DeliveryResult, DueEntry, InboundKey, InboundStatus, IpmbStats, Message,
    OutgoingRequest, RetryQueue, SequenceTracker, StatsSnapshot,
};
use crate::events::{DeliveryError, TransportError};
use crate::ports::{IpmbApi, PendingReply};
use crate::transport::{BusControls, DualBusTransport, ReceivedFrame};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

struct Shared {
    local_address: u8,
    submit_tx: mpsc::UnboundedSender<OutgoingRequest>,
    sequences: SequenceTracker,
    controls: BusControls,
    stats: Arc<IpmbStats>,
    dispatch: Arc<CommandDispatchTable>,
    shutdown_tx: watch::Sender<bool>,
}

/// Client handle to a running IPMB interface. Cheap to clone.
#[derive(Clone)]
pub struct IpmbHandle {
    shared: Arc<Shared>,
}

impl IpmbHandle {
    pub fn local_address(&self) -> u8 {
        self.shared.local_address
    }

    /// Submit a request; a sequence number is assigned here.
    ///
    /// Fails immediately, without queueing, when both buses are disabled or
    /// the sequence pool for the target is exhausted.
    pub fn send_request(&self, mut msg: Message) -> Result<PendingReply, DeliveryError> {
        if msg.is_response() {
            return Err(DeliveryError::NotARequest { net_fn: msg.net_fn });
        }
        msg.encode()?;
        self.ensure_route(&msg)?;

        let Some(seq) = self
            .shared
            .sequences
            .allocate(msg.rs_addr, msg.net_fn, msg.cmd)
        else {
            IpmbStats::incr(&self.shared.stats.no_available_sequence);
            warn!(%msg, "No available sequence number");
            return Err(DeliveryError::NoSequenceAvailable {
                target: msg.rs_addr,
                net_fn: msg.net_fn,
                cmd: msg.cmd,
            });
        };
        msg.rq_seq = seq;
        let (target, net_fn, cmd) = (msg.rs_addr, msg.net_fn, msg.cmd);

        let (tx, rx) = oneshot::channel();
        if let Err(error) = self.submit(OutgoingRequest::new(msg, Some(tx))) {
            self.shared.sequences.release(target, net_fn, cmd, seq);
            return Err(error);
        }
        Ok(PendingReply::new(seq, rx))
    }

    /// Submit a response. It is cached so a duplicate of the request it
    /// answers gets the same reply without re-running the handler.
    pub fn send_response(&self, msg: Message) -> Result<(), DeliveryError> {
        if !msg.is_response() {
            return Err(DeliveryError::NotAResponse { net_fn: msg.net_fn });
        }
        msg.encode()?;
        self.ensure_route(&msg)?;
        self.shared.sequences.record_reply(&msg);
        self.submit(OutgoingRequest::new(msg, None))
    }

    /// Submit a request and wait for its outcome.
    pub async fn request(&self, msg: Message) -> DeliveryResult {
        self.send_request(msg)?.await
    }

    /// Answer `request` with `data`, completion code first.
    pub fn reply(&self, request: &Message, data: Vec<u8>) -> Result<(), DeliveryError> {
        self.send_response(request.prepare_reply(data))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn dispatch_table(&self) -> &Arc<CommandDispatchTable> {
        &self.shared.dispatch
    }

    pub fn register_handler<H>(&self, net_fn: u8, cmd: u8, handler: H) -> bool
    where
        H: CommandHandler + 'static,
    {
        self.shared.dispatch.register_handler(net_fn, cmd, handler)
    }

    pub fn unregister_handler(&self, net_fn: u8, cmd: u8) -> bool {
        self.shared.dispatch.unregister_handler(net_fn, cmd)
    }

    pub fn bus_controls(&self) -> &BusControls {
        &self.shared.controls
    }

    pub fn enable_bus(&self, bus: BusId) {
        self.shared.controls.set_enabled(bus, true);
    }

    pub fn disable_bus(&self, bus: BusId) {
        self.shared.controls.set_enabled(bus, false);
    }

    pub fn is_bus_enabled(&self, bus: BusId) -> bool {
        self.shared.controls.is_enabled(bus)
    }

    /// Stop the worker. In-flight requests complete with
    /// [`DeliveryError::Shutdown`].
    pub fn shutdown(&self) {
        self.shared.shutdown_tx.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shared.shutdown_tx.borrow()
    }

    fn is_loopback(&self, msg: &Message) -> bool {
        msg.rs_addr == self.shared.local_address
    }

    fn ensure_route(&self, msg: &Message) -> Result<(), DeliveryError> {
        if self.is_loopback(msg) || self.shared.controls.any_enabled() {
            return Ok(());
        }
        IpmbStats::incr(&self.shared.stats.no_bus_available);
        warn!(%msg, "Both buses disabled, message not queued");
        Err(DeliveryError::NoBusEnabled)
    }

    fn submit(&self, request: OutgoingRequest) -> Result<(), DeliveryError> {
        if self.is_shut_down() {
            return Err(DeliveryError::Shutdown);
        }
        self.shared
            .submit_tx
            .send(request)
            .map_err(|_| DeliveryError::Shutdown)
    }
}

impl IpmbApi for IpmbHandle {
    fn local_address(&self) -> u8 {
        IpmbHandle::local_address(self)
    }

    fn send_request(&self, msg: Message) -> Result<PendingReply, DeliveryError> {
        IpmbHandle::send_request(self, msg)
    }

    fn send_response(&self, msg: Message) -> Result<(), DeliveryError> {
        IpmbHandle::send_response(self, msg)
    }
}

enum Wake {
    Shutdown,
    Frame(ReceivedFrame),
    Submitted(OutgoingRequest),
    Timer,
}

/// The transport worker.
pub struct IpmbService {
    handle: IpmbHandle,
    transport: DualBusTransport,
    queue: RetryQueue,
    submit_rx: mpsc::UnboundedReceiver<OutgoingRequest>,
    shutdown_rx: watch::Receiver<bool>,
    loopback: VecDeque<Message>,
}

impl IpmbService {
    pub fn new(
        config: IpmbConfig,
        transport: DualBusTransport,
        dispatch: Arc<CommandDispatchTable>,
    ) -> (Self, IpmbHandle) {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = IpmbHandle {
            shared: Arc::new(Shared {
                local_address: config.local_address,
                submit_tx,
                sequences: SequenceTracker::new(
                    config.sequence_reuse_window(),
                    config.duplicate_window,
                ),
                controls: transport.controls(),
                stats: transport.stats(),
                dispatch,
                shutdown_tx,
            }),
        };

        let service = Self {
            handle: handle.clone(),
            transport,
            queue: RetryQueue::new(config.retry_policy()),
            submit_rx,
            shutdown_rx,
            loopback: VecDeque::new(),
        };
        (service, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(
            address = %format!("{:#04x}", self.handle.local_address()),
            "IPMB worker started"
        );

        while !*self.shutdown_rx.borrow() {
            while let Some(msg) = self.loopback.pop_front() {
                self.handle_message(msg, None);
            }

            let deadline = self.queue.next_deadline();
            let wake = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => Wake::Shutdown,
                Some(frame) = self.transport.recv() => Wake::Frame(frame),
                Some(request) = self.submit_rx.recv() => Wake::Submitted(request),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Timer,
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Frame(frame) => self.handle_frame(frame),
                Wake::Submitted(request) => {
                    self.enqueue(request);
                    while let Ok(request) = self.submit_rx.try_recv() {
                        self.enqueue(request);
                    }
                }
                Wake::Timer => {}
            }

            self.process_due().await;
        }

        self.abandon_pending();
        info!("IPMB worker stopped");
    }

    fn enqueue(&mut self, request: OutgoingRequest) {
        self.queue.push(request);
        self.handle.shared.stats.raise_highwater(self.queue.len());
    }

    fn handle_frame(&mut self, frame: ReceivedFrame) {
        match Message::decode(&frame.bytes, self.handle.local_address()) {
            Ok(msg) => self.handle_message(msg, Some(frame.bus)),
            Err(error) => {
                IpmbStats::incr(&self.handle.shared.stats.malformed_frames);
                debug!(bus = %frame.bus, %error, len = frame.bytes.len(), "Dropping malformed frame");
            }
        }
    }

    fn handle_message(&mut self, msg: Message, bus: Option<BusId>) {
        let stats = Arc::clone(&self.handle.shared.stats);
        IpmbStats::incr(&stats.messages_received);

        if msg.is_response() {
            match self.queue.match_reply(&msg) {
                Some(request) => {
                    IpmbStats::incr(&stats.messages_delivered);
                    request.complete(Ok(msg));
                }
                None => {
                    IpmbStats::incr(&stats.unexpected_replies);
                    debug!(%msg, "Unexpected reply");
                }
            }
            return;
        }

        let duplicate = match self
            .handle
            .shared
            .sequences
            .check_inbound(InboundKey::of_request(&msg))
        {
            InboundStatus::Fresh => false,
            InboundStatus::Duplicate {
                cached_reply: Some(reply),
            } => {
                IpmbStats::incr(&stats.duplicate_requests);
                debug!(%msg, "Duplicate request, resending cached reply");
                if let Err(error) = self.handle.send_response(reply) {
                    debug!(%error, "Could not resend cached reply");
                }
                return;
            }
            InboundStatus::Duplicate { cached_reply: None } => {
                IpmbStats::incr(&stats.duplicate_requests);
                debug!(%msg, "Duplicate request");
                true
            }
        };

        let request = InboundRequest {
            message: msg,
            bus,
            duplicate,
        };
        let dispatch = Arc::clone(&self.handle.shared.dispatch);
        dispatch.dispatch(&self.handle, &request);
    }

    async fn process_due(&mut self) {
        let stats = Arc::clone(&self.handle.shared.stats);

        for entry in self.queue.take_due(Instant::now()) {
            match entry {
                DueEntry::Expired(request) => {
                    IpmbStats::incr(&stats.send_failures);
                    let attempts = u32::from(request.retry_count);
                    if request.has_waiter() || request.message.is_response() {
                        warn!(msg = %request.message, attempts, "Delivery failed, retries exhausted");
                    }
                    request.complete(Err(DeliveryError::RetriesExhausted { attempts }));
                }
                DueEntry::Transmit {
                    id,
                    message,
                    retry_count,
                } => {
                    let sent = if self.handle.is_loopback(&message) {
                        IpmbStats::incr(&stats.send_attempts);
                        self.loopback.push_back(message.clone());
                        true
                    } else {
                        match self.transport.send(&message, retry_count).await {
                            Ok(_) => {
                                IpmbStats::incr(&stats.send_attempts);
                                true
                            }
                            Err(TransportError::NoBusEnabled) => {
                                // Disabled after queueing: nothing went out.
                                IpmbStats::incr(&stats.no_bus_available);
                                debug!(%message, retry_count, "No bus enabled for attempt");
                                false
                            }
                            Err(error) => {
                                IpmbStats::incr(&stats.send_attempts);
                                debug!(%message, retry_count, %error, "Attempt failed");
                                false
                            }
                        }
                    };

                    if sent && message.is_response() {
                        IpmbStats::incr(&stats.messages_delivered);
                        self.queue.remove(id);
                    } else {
                        self.queue.reschedule(id, Instant::now());
                    }
                }
            }
        }
    }

    fn abandon_pending(&mut self) {
        self.submit_rx.close();
        let mut abandoned = self.queue.drain();
        while let Ok(request) = self.submit_rx.try_recv() {
            abandoned.push(request);
        }
        if !abandoned.is_empty() {
            info!(count = abandoned.len(), "Abandoning in-flight messages");
        }
        for request in abandoned {
            request.complete(Err(DeliveryError::Shutdown));
        }
    }
}
