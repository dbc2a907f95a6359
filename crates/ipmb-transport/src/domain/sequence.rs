//! # Sequence Tracking
//!
//! Two independent tables, both aged by a validity window:
//!
//! - **Outbound**: which sequence numbers were recently used towards a
//!   `(target, netfn, cmd)`. A sequence is reusable only once its record has
//!   aged out, so a late reply can never be matched to a newer request.
//! - **Inbound**: which `(source, netfn, cmd, seq)` requests were recently
//!   received. A repeat inside the window is a duplicate. The reply sent for
//!   a request is cached so a duplicate can be answered without running the
//!   handler again.

use super::message::{Message, MAX_SEQUENCE};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Outbound sequence key: where a request is going.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    pub target: u8,
    pub net_fn: u8,
    pub cmd: u8,
}

impl SequenceKey {
    pub fn of_request(msg: &Message) -> Self {
        Self {
            target: msg.rs_addr,
            net_fn: msg.net_fn,
            cmd: msg.cmd,
        }
    }
}

/// Inbound key: who sent a request and with which sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InboundKey {
    pub source: u8,
    pub net_fn: u8,
    pub cmd: u8,
    pub seq: u8,
}

impl InboundKey {
    pub fn of_request(msg: &Message) -> Self {
        Self {
            source: msg.rq_addr,
            net_fn: msg.net_fn,
            cmd: msg.cmd,
            seq: msg.rq_seq,
        }
    }

    /// Key of the request a reply answers.
    pub fn answered_by(reply: &Message) -> Self {
        Self {
            source: reply.rs_addr,
            net_fn: reply.net_fn & 0xFE,
            cmd: reply.cmd,
            seq: reply.rq_seq,
        }
    }
}

/// Result of checking an inbound request against the duplicate table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundStatus {
    Fresh,
    Duplicate { cached_reply: Option<Message> },
}

/// Recently used outbound sequence numbers.
#[derive(Debug)]
pub struct SequenceTable {
    last_used: HashMap<(SequenceKey, u8), Instant>,
    validity: Duration,
}

impl SequenceTable {
    pub fn new(validity: Duration) -> Self {
        Self {
            last_used: HashMap::new(),
            validity,
        }
    }

    /// First sequence for `key` outside the validity window, marked used.
    pub fn allocate(&mut self, key: SequenceKey, now: Instant) -> Option<u8> {
        self.expire(now);
        let seq = (0..=MAX_SEQUENCE).find(|seq| !self.last_used.contains_key(&(key, *seq)))?;
        self.last_used.insert((key, seq), now);
        Some(seq)
    }

    pub fn note_used(&mut self, key: SequenceKey, seq: u8, now: Instant) {
        self.last_used.insert((key, seq), now);
    }

    /// Return a sequence that never went out on the bus.
    pub fn release(&mut self, key: SequenceKey, seq: u8) {
        self.last_used.remove(&(key, seq));
    }

    pub fn is_in_use(&self, key: SequenceKey, seq: u8, now: Instant) -> bool {
        self.last_used
            .get(&(key, seq))
            .is_some_and(|used| now.saturating_duration_since(*used) < self.validity)
    }

    pub fn len(&self) -> usize {
        self.last_used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_used.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        let validity = self.validity;
        self.last_used
            .retain(|_, used| now.saturating_duration_since(*used) < validity);
    }
}

#[derive(Debug)]
struct InboundRecord {
    last_seen: Instant,
    reply: Option<Message>,
}

/// Recently received inbound requests.
#[derive(Debug)]
pub struct DuplicateTable {
    seen: HashMap<InboundKey, InboundRecord>,
    window: Duration,
}

impl DuplicateTable {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            window,
        }
    }

    /// Classify an inbound request and refresh its timestamp.
    pub fn check(&mut self, key: InboundKey, now: Instant) -> InboundStatus {
        self.expire(now);
        match self.seen.get_mut(&key) {
            Some(record) => {
                record.last_seen = now;
                InboundStatus::Duplicate {
                    cached_reply: record.reply.clone(),
                }
            }
            None => {
                self.seen.insert(
                    key,
                    InboundRecord {
                        last_seen: now,
                        reply: None,
                    },
                );
                InboundStatus::Fresh
            }
        }
    }

    /// Remember the reply sent for a request still in the table.
    pub fn record_reply(&mut self, reply: &Message) {
        if let Some(record) = self.seen.get_mut(&InboundKey::answered_by(reply)) {
            record.reply = Some(reply.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, record| now.saturating_duration_since(record.last_seen) < window);
    }
}

/// Both tables, each behind its own lock.
///
/// No method holds one lock while taking the other.
#[derive(Debug)]
pub struct SequenceTracker {
    outbound: Mutex<SequenceTable>,
    inbound: Mutex<DuplicateTable>,
}

impl SequenceTracker {
    pub fn new(outbound_validity: Duration, inbound_window: Duration) -> Self {
        Self {
            outbound: Mutex::new(SequenceTable::new(outbound_validity)),
            inbound: Mutex::new(DuplicateTable::new(inbound_window)),
        }
    }

    pub fn allocate(&self, target: u8, net_fn: u8, cmd: u8) -> Option<u8> {
        self.outbound
            .lock()
            .allocate(SequenceKey { target, net_fn, cmd }, Instant::now())
    }

    pub fn note_used(&self, target: u8, net_fn: u8, cmd: u8, seq: u8) {
        self.outbound
            .lock()
            .note_used(SequenceKey { target, net_fn, cmd }, seq, Instant::now());
    }

    pub fn release(&self, target: u8, net_fn: u8, cmd: u8, seq: u8) {
        self.outbound
            .lock()
            .release(SequenceKey { target, net_fn, cmd }, seq);
    }

    pub fn is_duplicate(&self, source: u8, net_fn: u8, cmd: u8, seq: u8) -> bool {
        matches!(
            self.check_inbound(InboundKey {
                source,
                net_fn,
                cmd,
                seq
            }),
            InboundStatus::Duplicate { .. }
        )
    }

    pub fn check_inbound(&self, key: InboundKey) -> InboundStatus {
        self.inbound.lock().check(key, Instant::now())
    }

    pub fn record_reply(&self, reply: &Message) {
        self.inbound.lock().record_reply(reply);
    }
}
