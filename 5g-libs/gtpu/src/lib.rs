//! lib - encode and decode GTP-U T-PDUs
#![allow(clippy::unusual_byte_groupings)]

use thiserror::Error;

pub const GTPU_PORT: u16 = 2152; // TS29.281
pub const GTPU_MESSAGE_TYPE_TPDU: u8 = 255; // TS29.281, table 6.1-1
pub const GTPU_HEADER_LEN: usize = 8;
pub const GTPU_OPTIONAL_FIELDS_LEN: usize = 4;

// Flags byte, TS29.281, 5.1.
const FLAGS_VERSION_MASK: u8 = 0b111_0_0_0_0_0;
const FLAGS_VERSION_1: u8 = 0b001_0_0_0_0_0;
const FLAGS_PT: u8 = 0b000_1_0_0_0_0;
const FLAGS_E: u8 = 0b000_0_0_1_0_0;
const FLAGS_S: u8 = 0b000_0_0_0_1_0;
const FLAGS_PN: u8 = 0b000_0_0_0_0_1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("GTP-U frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("Not GTPv1 / GTP-U (flags {0:#04x})")]
    BadVersion(u8),
    #[error("Unsupported GTP-U message type {0}")]
    UnsupportedType(u8),
    #[error("Declared length {declared} but {available} bytes follow the header")]
    BadLength { declared: usize, available: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Payload of {0} bytes does not fit a GTP-U length field")]
    PayloadTooLong(usize),
}

/// A GTP-U T-PDU.  The payload is borrowed from the buffer it was decoded from
/// or that it is about to be encoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtpuFrame<'a> {
    pub teid: u32,
    pub sequence: Option<u16>,
    pub payload: &'a [u8],
}

impl<'a> GtpuFrame<'a> {
    pub fn new(teid: u32, sequence: Option<u16>, payload: &'a [u8]) -> Self {
        GtpuFrame {
            teid,
            sequence,
            payload,
        }
    }

    fn header_len(&self) -> usize {
        if self.sequence.is_some() {
            GTPU_HEADER_LEN + GTPU_OPTIONAL_FIELDS_LEN
        } else {
            GTPU_HEADER_LEN
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Append the encoded frame to `buf`.  Nothing is written on error.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        // The length field counts everything after the mandatory 8 byte header.
        let length = self.encoded_len() - GTPU_HEADER_LEN;
        let length =
            u16::try_from(length).map_err(|_| EncodeError::PayloadTooLong(self.payload.len()))?;

        let flags = match self.sequence {
            Some(_) => FLAGS_VERSION_1 | FLAGS_PT | FLAGS_S,
            None => FLAGS_VERSION_1 | FLAGS_PT,
        };
        buf.push(flags);
        buf.push(GTPU_MESSAGE_TYPE_TPDU);
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&self.teid.to_be_bytes());
        if let Some(sequence) = self.sequence {
            buf.extend_from_slice(&sequence.to_be_bytes());
            buf.push(0); // N-PDU number
            buf.push(0); // next extension header type = none
        }
        buf.extend_from_slice(self.payload);
        Ok(())
    }
}

/// Decode a GTP-U T-PDU.  `bytes` must be exactly the UDP payload.
pub fn decode(bytes: &[u8]) -> Result<GtpuFrame<'_>, DecodeError> {
    if bytes.len() < GTPU_HEADER_LEN {
        return Err(DecodeError::TooShort(bytes.len()));
    }
    let flags = bytes[0];
    if flags & FLAGS_VERSION_MASK != FLAGS_VERSION_1 || flags & FLAGS_PT == 0 {
        return Err(DecodeError::BadVersion(flags));
    }
    if bytes[1] != GTPU_MESSAGE_TYPE_TPDU {
        return Err(DecodeError::UnsupportedType(bytes[1]));
    }

    let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let available = bytes.len() - GTPU_HEADER_LEN;
    if declared != available {
        return Err(DecodeError::BadLength {
            declared,
            available,
        });
    }
    let teid = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    // Any of E, S or PN means the 4 optional bytes are present.  Extension
    // headers are left in the payload uninterpreted.
    if flags & (FLAGS_E | FLAGS_S | FLAGS_PN) == 0 {
        return Ok(GtpuFrame::new(teid, None, &bytes[GTPU_HEADER_LEN..]));
    }
    let payload_offset = GTPU_HEADER_LEN + GTPU_OPTIONAL_FIELDS_LEN;
    if bytes.len() < payload_offset {
        return Err(DecodeError::TooShort(bytes.len()));
    }
    let sequence = (flags & FLAGS_S != 0).then(|| u16::from_be_bytes([bytes[8], bytes[9]]));
    Ok(GtpuFrame::new(teid, sequence, &bytes[payload_offset..]))
}

/// Read just the TEID of a GTP-U frame without validating the rest.
pub fn peek_teid(bytes: &[u8]) -> Option<u32> {
    let teid = bytes.get(4..8)?;
    Some(u32::from_be_bytes([teid[0], teid[1], teid[2], teid[3]]))
}
