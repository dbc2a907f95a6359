//! Error types for the IPMB transport.

use crate::domain::BusId;
use thiserror::Error;

/// Which checksum of a frame failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumSpan {
    Header,
    Body,
}

/// Frame encode/decode errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Frame truncated: {len} bytes")]
    Truncated { len: usize },

    #[error("Frame too long: {len} bytes (max: {max})")]
    Oversized { len: usize, max: usize },

    #[error("Payload too large: {len} bytes (max: {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("{span:?} checksum mismatch")]
    ChecksumMismatch { span: ChecksumSpan },

    #[error("Frame addressed to {actual:#04x}, local address is {expected:#04x}")]
    Misaddressed { expected: u8, actual: u8 },

    #[error("Field {field} out of range: {value:#04x} (max: {max:#04x})")]
    FieldOutOfRange {
        field: &'static str,
        value: u8,
        max: u8,
    },
}

/// Errors from a single transmission attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Both buses are administratively disabled")]
    NoBusEnabled,

    #[error("Transmission failed on bus {0}")]
    TransmitFailed(BusId),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Why an outbound message was not delivered.
///
/// Every submitted request receives exactly one outcome: either its reply
/// or one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("No free sequence number for target {target:#04x} netfn {net_fn:#04x} cmd {cmd:#04x}")]
    NoSequenceAvailable { target: u8, net_fn: u8, cmd: u8 },

    #[error("Both buses are administratively disabled")]
    NoBusEnabled,

    #[error("No reply after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Transport is shut down")]
    Shutdown,

    #[error("Expected a request, netfn {net_fn:#04x} is a response")]
    NotARequest { net_fn: u8 },

    #[error("Expected a response, netfn {net_fn:#04x} is a request")]
    NotAResponse { net_fn: u8 },

    #[error(transparent)]
    Codec(#[from] CodecError),
}
