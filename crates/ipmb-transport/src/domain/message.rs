//! # IPMB Message Codec
//!
//! Wire layout of one IPMB frame:
//!
//! ```text
//! [0x00]? rsSA | netFn<<2|rsLUN | hsum | rqSA | rqSeq<<2|rqLUN | cmd | data.. | bsum
//!   │     └──────── header ───────────┘  └─────────────── body ──────────────────┘
//!   └ broadcast marker, stripped on decode
//! ```
//!
//! Both checksums are the 8-bit two's complement of their span, so a valid
//! frame sums to zero over `header + hsum` and over `body + bsum`.

use crate::events::{ChecksumSpan, CodecError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bus MTU, counted after the responder address byte.
pub const IPMB_MTU: usize = 32;

/// Fixed bytes around the payload: five header/body fields plus two checksums.
pub const FRAME_OVERHEAD: usize = 7;

/// Largest payload this codec produces or accepts.
pub const MAX_DATA_LEN: usize = 26;

/// Largest frame excluding the broadcast marker.
pub const MAX_FRAME_LEN: usize = FRAME_OVERHEAD + MAX_DATA_LEN;

/// Sequence numbers are six bits wide.
pub const MAX_SEQUENCE: u8 = 0x3F;

const MAX_NET_FN: u8 = 0x3F;
const MAX_LUN: u8 = 0x03;

/// An IPMI message as carried on IPMB.
///
/// Checksums are derived during encoding and never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Responder slave address.
    pub rs_addr: u8,
    /// Network function (6 bits). Odd values are responses.
    pub net_fn: u8,
    /// Responder LUN (2 bits).
    pub rs_lun: u8,
    /// Requester slave address.
    pub rq_addr: u8,
    /// Requester sequence (6 bits).
    pub rq_seq: u8,
    /// Requester LUN (2 bits).
    pub rq_lun: u8,
    /// Command code.
    pub cmd: u8,
    /// Command payload.
    pub data: Vec<u8>,
    /// Frame carried the broadcast marker.
    pub broadcast: bool,
}

impl Message {
    /// Build a request from `rq_addr` to `rs_addr`. The sequence is assigned
    /// by the transport when the request is submitted.
    pub fn request(rq_addr: u8, rs_addr: u8, net_fn: u8, cmd: u8, data: Vec<u8>) -> Self {
        Self {
            rs_addr,
            net_fn,
            rq_addr,
            cmd,
            data,
            ..Self::default()
        }
    }

    /// Whether the network function marks this as a response.
    pub fn is_response(&self) -> bool {
        self.net_fn & 0x01 == 0x01
    }

    /// Build the response to this request: addresses and LUNs swapped,
    /// response network function, same command and sequence.
    pub fn prepare_reply(&self, data: Vec<u8>) -> Message {
        Message {
            rs_addr: self.rq_addr,
            net_fn: self.net_fn | 0x01,
            rs_lun: self.rq_lun,
            rq_addr: self.rs_addr,
            rq_seq: self.rq_seq,
            rq_lun: self.rs_lun,
            cmd: self.cmd,
            data,
            broadcast: false,
        }
    }

    /// Whether `reply` answers this request.
    pub fn matches_reply(&self, reply: &Message) -> bool {
        self.rq_addr == reply.rs_addr
            && self.rs_addr == reply.rq_addr
            && self.rq_lun == reply.rs_lun
            && self.rs_lun == reply.rq_lun
            && self.rq_seq == reply.rq_seq
            && self.net_fn == reply.net_fn & 0xFE
            && self.cmd == reply.cmd
    }

    /// First data byte of a response.
    pub fn completion_code(&self) -> Option<u8> {
        if self.is_response() {
            self.data.first().copied()
        } else {
            None
        }
    }

    /// Serialize to a wire frame, recomputing both checksums.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(CodecError::PayloadTooLarge {
                len: self.data.len(),
                max: MAX_DATA_LEN,
            });
        }
        check_field("net_fn", self.net_fn, MAX_NET_FN)?;
        check_field("rs_lun", self.rs_lun, MAX_LUN)?;
        check_field("rq_lun", self.rq_lun, MAX_LUN)?;
        check_field("rq_seq", self.rq_seq, MAX_SEQUENCE)?;

        let mut frame = Vec::with_capacity(FRAME_OVERHEAD + self.data.len() + 1);
        if self.broadcast {
            frame.push(0x00);
        }
        let header_start = frame.len();
        frame.push(self.rs_addr);
        frame.push(self.net_fn << 2 | self.rs_lun);
        frame.push(checksum(&frame[header_start..]));

        let body_start = frame.len();
        frame.push(self.rq_addr);
        frame.push(self.rq_seq << 2 | self.rq_lun);
        frame.push(self.cmd);
        frame.extend_from_slice(&self.data);
        frame.push(checksum(&frame[body_start..]));
        Ok(frame)
    }

    /// Parse a wire frame received by the node at `local_address`.
    ///
    /// A leading zero byte marks a broadcast frame; broadcast frames are
    /// accepted whatever their responder address.
    pub fn decode(bytes: &[u8], local_address: u8) -> Result<Message, CodecError> {
        let (broadcast, frame) = match bytes {
            [0x00, rest @ ..] => (true, rest),
            _ => (false, bytes),
        };

        if frame.len() < FRAME_OVERHEAD {
            return Err(CodecError::Truncated { len: frame.len() });
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(CodecError::Oversized {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }
        if sum(&frame[..3]) != 0 {
            return Err(CodecError::ChecksumMismatch {
                span: ChecksumSpan::Header,
            });
        }
        if sum(&frame[3..]) != 0 {
            return Err(CodecError::ChecksumMismatch {
                span: ChecksumSpan::Body,
            });
        }
        if !broadcast && frame[0] != local_address {
            return Err(CodecError::Misaddressed {
                expected: local_address,
                actual: frame[0],
            });
        }

        Ok(Message {
            rs_addr: frame[0],
            net_fn: frame[1] >> 2,
            rs_lun: frame[1] & MAX_LUN,
            rq_addr: frame[3],
            rq_seq: frame[4] >> 2,
            rq_lun: frame[4] & MAX_LUN,
            cmd: frame[5],
            data: frame[6..frame.len() - 1].to_vec(),
            broadcast,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02x} -> {}{}.{:02x}: {:02x}.{:02x} (seq {:02x}) [",
            self.rq_lun,
            self.rq_addr,
            if self.broadcast { "*" } else { "" },
            self.rs_lun,
            self.rs_addr,
            self.net_fn,
            self.cmd,
            self.rq_seq,
        )?;
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        f.write_str("]")
    }
}

/// Two's complement checksum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    sum(bytes).wrapping_neg()
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn check_field(field: &'static str, value: u8, max: u8) -> Result<(), CodecError> {
    if value > max {
        Err(CodecError::FieldOutOfRange { field, value, max })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_device_id() -> Message {
        Message {
            rs_addr: 0x72,
            net_fn: 0x06,
            rs_lun: 0,
            rq_addr: 0x20,
            rq_seq: 0x11,
            rq_lun: 2,
            cmd: 0x01,
            data: vec![],
            broadcast: false,
        }
    }

    #[test]
    fn test_encode_known_frame() {
        let frame = get_device_id().encode().unwrap();
        // 0x72 + 0x18 + 0x76 == 0x100
        assert_eq!(frame, vec![0x72, 0x18, 0x76, 0x20, 0x46, 0x01, 0x99]);
    }

    #[test]
    fn test_round_trip_with_payload() {
        let mut msg = get_device_id();
        msg.data = vec![0x00, 0x12, 0x34, 0xFF];
        let frame = msg.encode().unwrap();
        assert_eq!(Message::decode(&frame, 0x72).unwrap(), msg);
    }

    #[test]
    fn test_round_trip_broadcast() {
        let mut msg = get_device_id();
        msg.rs_addr = 0x10;
        msg.broadcast = true;
        let frame = msg.encode().unwrap();
        assert_eq!(frame[0], 0x00);
        let decoded = Message::decode(&frame, 0x72).unwrap();
        assert!(decoded.broadcast);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_round_trip_max_payload() {
        let mut msg = get_device_id();
        msg.data = (0..MAX_DATA_LEN as u8).collect();
        let frame = msg.encode().unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);
        assert_eq!(frame.len() - 1, IPMB_MTU);
        assert_eq!(Message::decode(&frame, 0x72).unwrap(), msg);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut msg = get_device_id();
        msg.data = vec![0; MAX_DATA_LEN + 1];
        assert!(matches!(
            msg.encode(),
            Err(CodecError::PayloadTooLarge { len: 27, max: 26 })
        ));
    }

    #[test]
    fn test_encode_rejects_wide_fields() {
        let mut msg = get_device_id();
        msg.rq_seq = 0x40;
        assert!(matches!(
            msg.encode(),
            Err(CodecError::FieldOutOfRange { field: "rq_seq", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let mut frame = vec![0x72, 0x18, 0x76, 0x20, 0x46, 0x01];
        frame.extend(std::iter::repeat(0u8).take(MAX_DATA_LEN + 1));
        frame.push(0x99);
        assert!(matches!(
            Message::decode(&frame, 0x72),
            Err(CodecError::Oversized { len: 34, max: 33 })
        ));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(
            Message::decode(&[0x72, 0x18, 0x76, 0x20], 0x72),
            Err(CodecError::Truncated { len: 4 })
        ));
        // A lone broadcast marker leaves nothing to parse.
        assert!(matches!(
            Message::decode(&[0x00], 0x72),
            Err(CodecError::Truncated { len: 0 })
        ));
    }

    #[test]
    fn test_every_single_bit_flip_is_rejected() {
        let mut msg = get_device_id();
        msg.data = vec![0xDE, 0xAD];
        let frame = msg.encode().unwrap();
        for index in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[index] ^= 1 << bit;
                assert!(
                    Message::decode(&corrupted, 0x72).is_err(),
                    "byte {index} bit {bit} accepted"
                );
            }
        }
    }

    #[test]
    fn test_decode_reports_checksum_span() {
        let mut frame = get_device_id().encode().unwrap();
        frame[2] ^= 0x01;
        assert!(matches!(
            Message::decode(&frame, 0x72),
            Err(CodecError::ChecksumMismatch {
                span: ChecksumSpan::Header
            })
        ));

        let mut frame = get_device_id().encode().unwrap();
        frame[5] ^= 0x01;
        assert!(matches!(
            Message::decode(&frame, 0x72),
            Err(CodecError::ChecksumMismatch {
                span: ChecksumSpan::Body
            })
        ));
    }

    #[test]
    fn test_decode_rejects_misaddressed() {
        let frame = get_device_id().encode().unwrap();
        assert!(matches!(
            Message::decode(&frame, 0x82),
            Err(CodecError::Misaddressed {
                expected: 0x82,
                actual: 0x72
            })
        ));
    }

    #[test]
    fn test_reply_round_trip_matches_request() {
        let request = get_device_id();
        let reply = request.prepare_reply(vec![0x00, 0x01]);
        assert!(reply.is_response());
        assert_eq!(reply.rs_addr, 0x20);
        assert_eq!(reply.rq_addr, 0x72);
        assert_eq!(reply.rs_lun, 2);
        assert_eq!(reply.rq_lun, 0);
        assert_eq!(reply.net_fn, 0x07);
        assert!(request.matches_reply(&reply));
        assert_eq!(reply.completion_code(), Some(0x00));
        assert_eq!(request.completion_code(), None);
    }

    #[test]
    fn test_reply_with_other_sequence_does_not_match() {
        let request = get_device_id();
        let mut reply = request.prepare_reply(vec![0x00]);
        reply.rq_seq = 0x12;
        assert!(!request.matches_reply(&reply));
    }

    #[test]
    fn test_display() {
        let mut msg = get_device_id();
        msg.data = vec![0x01, 0xAB];
        assert_eq!(msg.to_string(), "2.20 -> 0.72: 06.01 (seq 11) [01 ab]");
    }
}
