//! Domain layer: wire format and delivery bookkeeping. No I/O.

pub mod bus_select;
pub mod completion;
pub mod message;
pub mod retry;
pub mod sequence;
pub mod stats;

pub use bus_select::{preferred_bus, select_bus, BusId};
pub use message::{checksum, Message, IPMB_MTU, MAX_DATA_LEN, MAX_FRAME_LEN, MAX_SEQUENCE};
pub use retry::{DeliveryResult, DueEntry, OutgoingRequest, RequestId, RetryPolicy, RetryQueue};
pub use sequence::{InboundKey, InboundStatus, SequenceKey, SequenceTracker};
pub use stats::{IpmbStats, StatsSnapshot};
