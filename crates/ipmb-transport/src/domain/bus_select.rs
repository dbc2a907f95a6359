//! Bus selection for the redundant IPMB pair (IPMB-A / IPMB-B).

use super::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two physical buses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusId {
    A,
    B,
}

impl BusId {
    pub const ALL: [BusId; 2] = [BusId::A, BusId::B];

    pub fn other(self) -> BusId {
        match self {
            BusId::A => BusId::B,
            BusId::B => BusId::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            BusId::A => 0,
            BusId::B => 1,
        }
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusId::A => f.write_str("IPMB-A"),
            BusId::B => f.write_str("IPMB-B"),
        }
    }
}

/// Preferred bus for one transmission attempt.
///
/// A wrapping byte sum of the message identity plus the retry count, so
/// successive attempts of the same message alternate buses.
pub fn preferred_bus(msg: &Message, retry_count: u8) -> BusId {
    let hash = [
        msg.rs_addr,
        msg.rs_lun,
        msg.rq_addr,
        msg.rq_lun,
        msg.rq_seq,
        msg.net_fn,
        msg.cmd,
        retry_count,
    ]
    .iter()
    .fold(0u8, |acc, b| acc.wrapping_add(*b));

    if hash % 2 == 0 {
        BusId::A
    } else {
        BusId::B
    }
}

/// Resolve the bus for an attempt given the administrative enable state.
///
/// Falls over to the other bus when the preferred one is disabled.
pub fn select_bus(msg: &Message, retry_count: u8, enabled: [bool; 2]) -> Option<BusId> {
    let preferred = preferred_bus(msg, retry_count);
    if enabled[preferred.index()] {
        Some(preferred)
    } else if enabled[preferred.other().index()] {
        Some(preferred.other())
    } else {
        None
    }
}
