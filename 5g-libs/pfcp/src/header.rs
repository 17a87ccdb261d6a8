//! header - PFCP message header
//!
//! ```text
//!  byte 0     | S | version | spare       |
//!  byte 1     message type
//!  bytes 2-3  message length (octets after byte 3)
//!  bytes 4-11 SEID (only when S=1)
//!  then       24-bit sequence number, 1 spare byte
//! ```
use crate::{DecodeError, EncodeError};
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

pub const PFCP_PORT: u16 = 8805; // TS29.244
pub const PFCP_HEADER_LEN: usize = 8;
pub const PFCP_HEADER_LEN_WITH_SEID: usize = 16;

const PFCP_VERSION: u8 = 1;
const FLAG_S: u8 = 0b1000_0000;
const VERSION_SHIFT: u8 = 5;
const VERSION_MASK: u8 = 0b0110_0000;
const MAX_SEQUENCE: u32 = 0x00ff_ffff;
const FIRST_SESSION_MESSAGE_TYPE: u8 = 50;

// Bytes 0-3 are not counted by the length field.
const LENGTH_EXCLUDED: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    HeartbeatRequest = 1,
    HeartbeatResponse = 2,
    SessionEstablishmentRequest = 50,
    SessionEstablishmentResponse = 51,
    SessionModificationRequest = 52,
    SessionModificationResponse = 53,
    SessionDeletionRequest = 54,
    SessionDeletionResponse = 55,
    #[num_enum(catch_all)]
    Other(u8),
}

impl MessageType {
    /// Session messages carry a SEID in their header.  Node messages do not.
    pub fn is_session_message(self) -> bool {
        u8::from(self) >= FIRST_SESSION_MESSAGE_TYPE
    }

    /// The message type that answers this one, or None if this is itself a response.
    pub fn response_type(self) -> Option<MessageType> {
        let value = u8::from(self);
        // Each request type is followed by its response type.  Node requests are odd,
        // session requests are even.
        let is_request = if self.is_session_message() {
            value % 2 == 0
        } else {
            value % 2 == 1
        };
        if !is_request {
            return None;
        }
        value.checked_add(1).map(MessageType::from)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Other(x) => write!(f, "PFCP message type {x}"),
            known => write!(f, "{known:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfcpHeader {
    pub message_type: MessageType,
    pub seid: Option<u64>,
    pub sequence: u32,
}

impl PfcpHeader {
    pub fn encoded_len(&self) -> usize {
        if self.seid.is_some() {
            PFCP_HEADER_LEN_WITH_SEID
        } else {
            PFCP_HEADER_LEN
        }
    }

    /// Append the header to `buf`, with the length field covering a body of
    /// `body_len` bytes of already serialized IEs.
    pub fn encode(&self, body_len: usize, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        if self.sequence > MAX_SEQUENCE {
            return Err(EncodeError::BadSequence(self.sequence));
        }
        let length = u16::try_from(self.encoded_len() - LENGTH_EXCLUDED + body_len)
            .map_err(|_| EncodeError::MessageTooLong(body_len))?;

        let mut flags = PFCP_VERSION << VERSION_SHIFT;
        if self.seid.is_some() {
            flags |= FLAG_S;
        }
        buf.push(flags);
        buf.push(self.message_type.into());
        buf.extend_from_slice(&length.to_be_bytes());
        if let Some(seid) = self.seid {
            buf.extend_from_slice(&seid.to_be_bytes());
        }
        buf.extend_from_slice(&self.sequence.to_be_bytes()[1..4]);
        buf.push(0); // spare
        Ok(())
    }

    /// Decode a header, returning it together with the IE bytes that its length
    /// field covers.
    pub fn decode(bytes: &[u8]) -> Result<(PfcpHeader, &[u8]), DecodeError> {
        let header = Self::peek(bytes).ok_or(DecodeError::TooShort(bytes.len()))?;
        let version = (bytes[0] & VERSION_MASK) >> VERSION_SHIFT;
        if version != PFCP_VERSION {
            return Err(DecodeError::BadVersion(version));
        }

        let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let available = bytes.len() - LENGTH_EXCLUDED;
        if declared != available || declared < header.encoded_len() - LENGTH_EXCLUDED {
            return Err(DecodeError::BadLength {
                declared,
                available,
            });
        }
        Ok((header, &bytes[header.encoded_len()..]))
    }

    /// Read the header fields without checking version or length.  Used to
    /// correlate a reply to a request that cannot be fully decoded.
    pub fn peek(bytes: &[u8]) -> Option<PfcpHeader> {
        let flags = *bytes.first()?;
        let message_type = MessageType::from(*bytes.get(1)?);
        let (seid, sequence_offset) = if flags & FLAG_S != 0 {
            let seid = bytes.get(4..12)?;
            (Some(u64::from_be_bytes(seid.try_into().ok()?)), 12)
        } else {
            (None, 4)
        };
        let sequence = bytes.get(sequence_offset..sequence_offset + 3)?;
        if bytes.len() < sequence_offset + 4 {
            return None;
        }
        Some(PfcpHeader {
            message_type,
            seid,
            sequence: u32::from_be_bytes([0, sequence[0], sequence[1], sequence[2]]),
        })
    }
}

/// Build a complete message from its header fields and already serialized IEs.  The
/// length field is always computed from `ies`.
pub fn encode_header(
    message_type: MessageType,
    seid: Option<u64>,
    sequence: u32,
    ies: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let header = PfcpHeader {
        message_type,
        seid,
        sequence,
    };
    let mut buf = Vec::with_capacity(header.encoded_len() + ies.len());
    header.encode(ies.len(), &mut buf)?;
    buf.extend_from_slice(ies);
    Ok(buf)
}
