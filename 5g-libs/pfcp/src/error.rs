//! error - PFCP codec errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("PFCP message too short ({0} bytes)")]
    TooShort(usize),

    #[error("Unsupported PFCP version {0}")]
    BadVersion(u8),

    #[error("Declared message length {declared} inconsistent with {available} bytes received")]
    BadLength { declared: usize, available: usize },

    #[error("IE type {ie_type} has invalid length {length}")]
    BadIeLength { ie_type: u16, length: usize },

    #[error("IE type {ie_type} has invalid content")]
    BadIeValue { ie_type: u16 },

    #[error("IE at offset {offset} runs past the end of the message")]
    TruncatedIe { offset: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("IE type {0} value too long")]
    IeTooLong(u16),

    #[error("Message body of {0} bytes too long")]
    MessageTooLong(usize),

    #[error("Sequence number {0} does not fit in 24 bits")]
    BadSequence(u32),
}
