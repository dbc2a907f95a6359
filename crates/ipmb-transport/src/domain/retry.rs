//! # Retry Queue
//!
//! In-flight outbound messages, oldest first.
//!
//! ```text
//! submit ──→ [due now] ──transmit──→ [due at now + backoff(n)] ──→ ... ──→ expired
//!                │                          │
//!                └──── reply matched ───────┴──→ completed (Ok)
//! ```
//!
//! The queue is pure bookkeeping. The worker owns it, asks it what is due,
//! performs the transmissions and reports the outcome back.

use super::message::Message;
use crate::events::DeliveryError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Outcome delivered to whoever submitted a request.
pub type DeliveryResult = Result<Message, DeliveryError>;

/// Opaque identifier of a queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// Backoff between attempts of the same message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the attempt numbered `retry_count`: `min(base << n, max)`.
    pub fn delay_for(&self, retry_count: u8) -> Duration {
        let factor = 1u32.checked_shl(u32::from(retry_count)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Longest time a message can stay in the queue.
    pub fn worst_case(&self) -> Duration {
        (0..=self.max_retries).map(|n| self.delay_for(n)).sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_millis(64),
            max_delay: Duration::from_millis(250),
        }
    }
}

/// An outbound message awaiting its reply or its next attempt.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub message: Message,
    pub retry_count: u8,
    pub next_retry: Instant,
    completion: Option<oneshot::Sender<DeliveryResult>>,
}

impl OutgoingRequest {
    pub fn new(message: Message, completion: Option<oneshot::Sender<DeliveryResult>>) -> Self {
        Self {
            message,
            retry_count: 0,
            next_retry: Instant::now(),
            completion,
        }
    }

    /// Deliver the outcome, consuming the request.
    ///
    /// The waiter may have gone away; that is not an error.
    pub fn complete(mut self, outcome: DeliveryResult) {
        if let Some(completion) = self.completion.take() {
            let _ = completion.send(outcome);
        }
    }

    pub fn has_waiter(&self) -> bool {
        self.completion.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// What the worker should do for an entry whose deadline passed.
#[derive(Debug)]
pub enum DueEntry {
    /// Transmit (or retransmit) this message.
    Transmit {
        id: RequestId,
        message: Message,
        retry_count: u8,
    },
    /// The retry ceiling was passed; the entry has been removed.
    Expired(OutgoingRequest),
}

/// Ordered collection of in-flight requests.
#[derive(Debug)]
pub struct RetryQueue {
    entries: VecDeque<(RequestId, OutgoingRequest)>,
    next_id: u64,
    policy: RetryPolicy,
    high_water: usize,
}

impl RetryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 0,
            policy,
            high_water: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn push(&mut self, request: OutgoingRequest) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.entries.push_back((id, request));
        self.high_water = self.high_water.max(self.entries.len());
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Earliest deadline in the queue.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(_, r)| r.next_retry).min()
    }

    /// Entries whose deadline is at or before `now`, in queue order.
    ///
    /// Entries past the retry ceiling are removed and returned as
    /// [`DueEntry::Expired`]; the rest stay queued until the worker calls
    /// [`RetryQueue::reschedule`] or [`RetryQueue::remove`].
    pub fn take_due(&mut self, now: Instant) -> Vec<DueEntry> {
        let max_retries = self.policy.max_retries;
        let mut due = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());

        for (id, request) in self.entries.drain(..) {
            if request.next_retry > now {
                kept.push_back((id, request));
            } else if request.retry_count > max_retries {
                due.push(DueEntry::Expired(request));
            } else {
                due.push(DueEntry::Transmit {
                    id,
                    message: request.message.clone(),
                    retry_count: request.retry_count,
                });
                kept.push_back((id, request));
            }
        }
        self.entries = kept;
        due
    }

    /// Record an attempt: push the deadline out by the backoff for the
    /// attempt just made and bump the retry counter.
    pub fn reschedule(&mut self, id: RequestId, now: Instant) {
        let policy = self.policy;
        if let Some((_, request)) = self.entries.iter_mut().find(|(i, _)| *i == id) {
            request.next_retry = now + policy.delay_for(request.retry_count);
            request.retry_count = request.retry_count.saturating_add(1);
        }
    }

    pub fn remove(&mut self, id: RequestId) -> Option<OutgoingRequest> {
        let index = self.entries.iter().position(|(i, _)| *i == id)?;
        self.entries.remove(index).map(|(_, request)| request)
    }

    /// Remove and return the oldest request that `reply` answers.
    pub fn match_reply(&mut self, reply: &Message) -> Option<OutgoingRequest> {
        let index = self
            .entries
            .iter()
            .position(|(_, r)| !r.message.is_response() && r.message.matches_reply(reply))?;
        self.entries.remove(index).map(|(_, request)| request)
    }

    /// Empty the queue, handing every entry back.
    pub fn drain(&mut self) -> Vec<OutgoingRequest> {
        self.entries.drain(..).map(|(_, request)| request).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seq: u8) -> Message {
        let mut msg = Message::request(0x20, 0x72, 0x04, 0x01, vec![]);
        msg.rq_seq = seq;
        msg
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(64));
        assert_eq!(policy.delay_for(1), Duration::from_millis(128));
        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
        assert_eq!(policy.delay_for(200), Duration::from_millis(250));
    }

    #[test]
    fn test_worst_case_fits_under_duplicate_window() {
        let policy = RetryPolicy::default();
        // 64 + 128 + 9 * 250
        assert_eq!(policy.worst_case(), Duration::from_millis(2442));
        assert!(policy.worst_case() < Duration::from_secs(5));
    }

    #[test]
    fn test_new_entry_is_due_immediately() {
        let mut queue = RetryQueue::new(RetryPolicy::default());
        let id = queue.push(OutgoingRequest::new(request(0), None));
        let due = queue.take_due(Instant::now());
        assert_eq!(due.len(), 1);
        assert!(matches!(
            &due[0],
            DueEntry::Transmit { id: due_id, retry_count: 0, .. } if *due_id == id
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_reschedule_moves_deadline() {
        let mut queue = RetryQueue::new(RetryPolicy::default());
        let now = Instant::now();
        let id = queue.push(OutgoingRequest::new(request(0), None));
        queue.take_due(now);
        queue.reschedule(id, now);

        assert_eq!(queue.next_deadline(), Some(now + Duration::from_millis(64)));
        assert!(queue.take_due(now + Duration::from_millis(63)).is_empty());
        assert!(matches!(
            queue.take_due(now + Duration::from_millis(64)).as_slice(),
            [DueEntry::Transmit { retry_count: 1, .. }]
        ));
    }

    #[test]
    fn test_attempts_bounded_by_max_retries() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        let mut queue = RetryQueue::new(policy);
        let (tx, mut rx) = oneshot::channel();
        queue.push(OutgoingRequest::new(request(0), Some(tx)));

        let mut now = Instant::now();
        let mut attempts = 0;
        loop {
            let due = queue.take_due(now);
            match due.into_iter().next() {
                Some(DueEntry::Transmit { id, .. }) => {
                    attempts += 1;
                    queue.reschedule(id, now);
                }
                Some(DueEntry::Expired(req)) => {
                    req.complete(Err(DeliveryError::RetriesExhausted { attempts }));
                    break;
                }
                None => {}
            }
            now += Duration::from_millis(250);
        }

        assert_eq!(attempts, 4);
        assert!(queue.is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(DeliveryError::RetriesExhausted { attempts: 4 })
        );
    }

    #[test]
    fn test_reply_completes_oldest_match_once() {
        let mut queue = RetryQueue::new(RetryPolicy::default());
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        queue.push(OutgoingRequest::new(request(5), Some(tx1)));
        queue.push(OutgoingRequest::new(request(5), Some(tx2)));

        let reply = request(5).prepare_reply(vec![0x00]);
        let matched = queue.match_reply(&reply).unwrap();
        matched.complete(Ok(reply.clone()));

        assert_eq!(rx1.try_recv().unwrap(), Ok(reply));
        assert!(rx2.try_recv().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_reply_for_unknown_sequence_is_unmatched() {
        let mut queue = RetryQueue::new(RetryPolicy::default());
        queue.push(OutgoingRequest::new(request(1), None));
        let reply = request(2).prepare_reply(vec![0x00]);
        assert!(queue.match_reply(&reply).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_returns_everything_in_order() {
        let mut queue = RetryQueue::new(RetryPolicy::default());
        queue.push(OutgoingRequest::new(request(1), None));
        queue.push(OutgoingRequest::new(request(2), None));
        let drained = queue.drain();
        assert_eq!(drained[0].message.rq_seq, 1);
        assert_eq!(drained[1].message.rq_seq, 2);
        assert!(queue.is_empty());
        assert_eq!(queue.high_water(), 2);
    }
}
