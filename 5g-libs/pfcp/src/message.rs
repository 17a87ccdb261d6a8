//! message - a PFCP header plus its information elements

use crate::ie::decode_ies;
use crate::{
    Cause, CreateFar, DecodeError, EncodeError, FSeid, FTeid, Ie, Mbr, MessageType, NodeId,
    OuterHeaderCreation, PfcpHeader, encode_header,
};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcpMessage {
    pub header: PfcpHeader,
    pub ies: Vec<Ie>,
}

// Accessors for the first IE of a given kind.
macro_rules! first_ie {
    ($name:ident, $variant:ident, $t:ty) => {
        pub fn $name(&self) -> Option<$t> {
            self.ies.iter().find_map(|ie| match ie {
                Ie::$variant(x) => Some(x.clone()),
                _ => None,
            })
        }
    };
}

impl PfcpMessage {
    pub fn new(message_type: MessageType, seid: Option<u64>, sequence: u32) -> Self {
        PfcpMessage {
            header: PfcpHeader {
                message_type,
                seid,
                sequence,
            },
            ies: vec![],
        }
    }

    pub fn with_ie(mut self, ie: Ie) -> Self {
        self.ies.push(ie);
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn seid(&self) -> Option<u64> {
        self.header.seid
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    /// Serialize the IEs and then prepend a header whose length field is
    /// computed from them.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut body = vec![];
        for ie in &self.ies {
            ie.encode(&mut body)?;
        }
        encode_header(
            self.header.message_type,
            self.header.seid,
            self.header.sequence,
            &body,
        )
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (header, body) = PfcpHeader::decode(bytes)?;
        let ies = decode_ies(body).map_err(|e| match e {
            // Report IE offsets relative to the start of the message.
            DecodeError::TruncatedIe { offset } => DecodeError::TruncatedIe {
                offset: offset + header.encoded_len(),
            },
            e => e,
        })?;
        Ok(PfcpMessage { header, ies })
    }

    first_ie!(cause, Cause, Cause);
    first_ie!(node_id, NodeId, NodeId);
    first_ie!(f_seid, FSeid, FSeid);
    first_ie!(f_teid, FTeid, FTeid);
    first_ie!(ue_ip_address, UeIpAddress, Ipv4Addr);
    first_ie!(outer_header_creation, OuterHeaderCreation, OuterHeaderCreation);
    first_ie!(user_id, UserId, String);
    first_ie!(pdu_session_id, PduSessionId, u8);
    first_ie!(precedence, Precedence, u32);
    first_ie!(mbr, Mbr, Mbr);
    first_ie!(recovery_time_stamp, RecoveryTimeStamp, u32);

    pub fn create_fars(&self) -> impl Iterator<Item = &CreateFar> {
        self.ies.iter().filter_map(|ie| match ie {
            Ie::CreateFar(far) => Some(far),
            _ => None,
        })
    }
}
