//! pfcp - the subset of the PFCP protocol (TS29.244) spoken between an SMF and the UPF
//!
//! Messages are a header followed by a sequence of type-length-value information
//! elements.  IEs that are not understood are carried through as raw bytes.

mod error;
mod header;
mod ie;
mod message;
mod sequence;


pub use error::{DecodeError, EncodeError};
pub use header::{
    MessageType, PFCP_HEADER_LEN, PFCP_HEADER_LEN_WITH_SEID, PFCP_PORT, PfcpHeader, encode_header,
};
pub use ie::{
    ApplyAction, Cause, CreateFar, DestinationInterface, FSeid, FTeid, Ie, Mbr, NodeId,
    OUTER_HEADER_CREATION_GTPU_UDP_IPV4, OuterHeaderCreation, ie_type,
};
pub use message::PfcpMessage;
pub use sequence::SequenceGenerator;
