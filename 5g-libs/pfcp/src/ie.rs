//! ie - PFCP information elements
//!
//! Each IE is a 2-byte type, a 2-byte length and then `length` bytes of value.
#![allow(clippy::unusual_byte_groupings)]

use crate::{DecodeError, EncodeError};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::net::Ipv4Addr;

pub mod ie_type {
    pub const CAUSE: u16 = 19;
    pub const F_TEID: u16 = 21;
    pub const MBR: u16 = 26;
    pub const PRECEDENCE: u16 = 29;
    pub const F_SEID: u16 = 57;
    pub const NODE_ID: u16 = 60;
    pub const CREATE_FAR: u16 = 70;
    pub const OUTER_HEADER_CREATION: u16 = 84;
    pub const UE_IP_ADDRESS: u16 = 93;
    pub const RECOVERY_TIME_STAMP: u16 = 96;
    pub const USER_ID: u16 = 141;
    // Local extension in the vendor-specific range.
    pub const PDU_SESSION_ID: u16 = 32769;
}

pub const IE_HEADER_LEN: usize = 4;
pub const OUTER_HEADER_CREATION_GTPU_UDP_IPV4: u16 = 0x0100;

const NODE_ID_TYPE_IPV4: u8 = 0;
const F_TEID_FLAG_V4: u8 = 0b0000_0_0_0_1;
const F_TEID_FLAG_CH: u8 = 0b0000_0_1_0_0;
const F_SEID_FLAG_V4: u8 = 0b0000_0_0_1_0;
const UE_IP_FLAG_V4: u8 = 0b0000_0_0_1_0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Cause {
    Accepted = 1,
    Invalid = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ApplyAction {
    Drop = 1,
    Forward = 2,
    Buffer = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum DestinationInterface {
    Ran = 1,
    ControlPlane = 2,
    DataNetwork = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeId {
    Ipv4(Ipv4Addr),
    // IPv6 and FQDN node IDs are carried but not interpreted.
    Other { node_id_type: u8, value: Vec<u8> },
}

/// Fully qualified TEID.  With `choose` set the UPF picks the TEID and the
/// `teid` field is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FTeid {
    pub teid: u32,
    pub ipv4: Option<Ipv4Addr>,
    pub choose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FSeid {
    pub seid: u64,
    pub ipv4: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateFar {
    pub far_id: u32,
    pub apply_action: ApplyAction,
    pub destination: DestinationInterface,
    pub outer_ip: Ipv4Addr,
    pub outer_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterHeaderCreation {
    pub description: u16,
    pub teid: u32,
}

/// Maximum bit rates in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mbr {
    pub uplink: u32,
    pub downlink: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ie {
    Cause(Cause),
    FTeid(FTeid),
    Mbr(Mbr),
    Precedence(u32),
    FSeid(FSeid),
    NodeId(NodeId),
    CreateFar(CreateFar),
    OuterHeaderCreation(OuterHeaderCreation),
    UeIpAddress(Ipv4Addr),
    RecoveryTimeStamp(u32),
    UserId(String),
    PduSessionId(u8),
    Unknown { ie_type: u16, value: Vec<u8> },
}

impl Ie {
    pub fn ie_type(&self) -> u16 {
        match self {
            Ie::Cause(_) => ie_type::CAUSE,
            Ie::FTeid(_) => ie_type::F_TEID,
            Ie::Mbr(_) => ie_type::MBR,
            Ie::Precedence(_) => ie_type::PRECEDENCE,
            Ie::FSeid(_) => ie_type::F_SEID,
            Ie::NodeId(_) => ie_type::NODE_ID,
            Ie::CreateFar(_) => ie_type::CREATE_FAR,
            Ie::OuterHeaderCreation(_) => ie_type::OUTER_HEADER_CREATION,
            Ie::UeIpAddress(_) => ie_type::UE_IP_ADDRESS,
            Ie::RecoveryTimeStamp(_) => ie_type::RECOVERY_TIME_STAMP,
            Ie::UserId(_) => ie_type::USER_ID,
            Ie::PduSessionId(_) => ie_type::PDU_SESSION_ID,
            Ie::Unknown { ie_type, .. } => *ie_type,
        }
    }

    /// Append the TLV encoding of this IE to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let ie_type = self.ie_type();
        let start = buf.len();
        buf.extend_from_slice(&ie_type.to_be_bytes());
        buf.extend_from_slice(&[0, 0]); // length, filled in below
        self.encode_value(buf);

        let value_len = buf.len() - start - IE_HEADER_LEN;
        let Ok(length) = u16::try_from(value_len) else {
            buf.truncate(start);
            return Err(EncodeError::IeTooLong(ie_type));
        };
        buf[start + 2..start + 4].copy_from_slice(&length.to_be_bytes());
        Ok(())
    }

    fn encode_value(&self, buf: &mut Vec<u8>) {
        match self {
            Ie::Cause(cause) => buf.push((*cause).into()),
            Ie::FTeid(f_teid) => {
                let mut flags = 0;
                if f_teid.ipv4.is_some() {
                    flags |= F_TEID_FLAG_V4;
                }
                if f_teid.choose {
                    flags |= F_TEID_FLAG_CH;
                }
                buf.push(flags);
                buf.extend_from_slice(&f_teid.teid.to_be_bytes());
                if let Some(ip) = f_teid.ipv4 {
                    buf.extend_from_slice(&ip.octets());
                }
            }
            Ie::Mbr(mbr) => {
                buf.extend_from_slice(&mbr.uplink.to_be_bytes());
                buf.extend_from_slice(&mbr.downlink.to_be_bytes());
            }
            Ie::Precedence(x) | Ie::RecoveryTimeStamp(x) => buf.extend_from_slice(&x.to_be_bytes()),
            Ie::FSeid(f_seid) => {
                buf.push(if f_seid.ipv4.is_some() { F_SEID_FLAG_V4 } else { 0 });
                buf.extend_from_slice(&f_seid.seid.to_be_bytes());
                if let Some(ip) = f_seid.ipv4 {
                    buf.extend_from_slice(&ip.octets());
                }
            }
            Ie::NodeId(NodeId::Ipv4(ip)) => {
                buf.push(NODE_ID_TYPE_IPV4);
                buf.extend_from_slice(&ip.octets());
            }
            Ie::NodeId(NodeId::Other {
                node_id_type,
                value,
            }) => {
                buf.push(*node_id_type);
                buf.extend_from_slice(value);
            }
            Ie::CreateFar(far) => {
                buf.extend_from_slice(&far.far_id.to_be_bytes());
                buf.push(far.apply_action.into());
                buf.extend_from_slice(&u32::from(far.destination).to_be_bytes());
                buf.extend_from_slice(&far.outer_ip.octets());
                buf.extend_from_slice(&far.outer_port.to_be_bytes());
            }
            Ie::OuterHeaderCreation(ohc) => {
                buf.extend_from_slice(&ohc.description.to_be_bytes());
                buf.extend_from_slice(&ohc.teid.to_be_bytes());
            }
            Ie::UeIpAddress(ip) => {
                buf.push(UE_IP_FLAG_V4);
                buf.extend_from_slice(&ip.octets());
            }
            Ie::UserId(supi) => buf.extend_from_slice(supi.as_bytes()),
            Ie::PduSessionId(id) => buf.push(*id),
            Ie::Unknown { value, .. } => buf.extend_from_slice(value),
        }
    }

    /// Decode the value part of an IE whose type and length have already been read.
    pub fn decode(ie_type: u16, value: &[u8]) -> Result<Ie, DecodeError> {
        let bad_length = || DecodeError::BadIeLength {
            ie_type,
            length: value.len(),
        };
        let bad_value = || DecodeError::BadIeValue { ie_type };
        let fixed = |len: usize| {
            if value.len() == len {
                Ok(value)
            } else {
                Err(bad_length())
            }
        };

        let ie = match ie_type {
            ie_type::CAUSE => {
                let v = fixed(1)?;
                Ie::Cause(Cause::try_from(v[0]).map_err(|_| bad_value())?)
            }
            ie_type::F_TEID => {
                let flags = *value.first().ok_or_else(bad_length)?;
                let ipv4 = flags & F_TEID_FLAG_V4 != 0;
                let v = fixed(if ipv4 { 9 } else { 5 })?;
                Ie::FTeid(FTeid {
                    teid: be_u32(&v[1..5]),
                    ipv4: ipv4.then(|| ipv4_at(&v[5..9])),
                    choose: flags & F_TEID_FLAG_CH != 0,
                })
            }
            ie_type::MBR => {
                let v = fixed(8)?;
                Ie::Mbr(Mbr {
                    uplink: be_u32(&v[0..4]),
                    downlink: be_u32(&v[4..8]),
                })
            }
            ie_type::PRECEDENCE => Ie::Precedence(be_u32(fixed(4)?)),
            ie_type::RECOVERY_TIME_STAMP => Ie::RecoveryTimeStamp(be_u32(fixed(4)?)),
            ie_type::F_SEID => {
                let flags = *value.first().ok_or_else(bad_length)?;
                let ipv4 = flags & F_SEID_FLAG_V4 != 0;
                let v = fixed(if ipv4 { 13 } else { 9 })?;
                let mut seid = [0u8; 8];
                seid.copy_from_slice(&v[1..9]);
                Ie::FSeid(FSeid {
                    seid: u64::from_be_bytes(seid),
                    ipv4: ipv4.then(|| ipv4_at(&v[9..13])),
                })
            }
            ie_type::NODE_ID => {
                let (node_id_type, rest) = value.split_first().ok_or_else(bad_length)?;
                match *node_id_type {
                    NODE_ID_TYPE_IPV4 => {
                        let v = fixed(5)?;
                        Ie::NodeId(NodeId::Ipv4(ipv4_at(&v[1..5])))
                    }
                    other => Ie::NodeId(NodeId::Other {
                        node_id_type: other,
                        value: rest.to_vec(),
                    }),
                }
            }
            ie_type::CREATE_FAR => {
                let v = fixed(15)?;
                Ie::CreateFar(CreateFar {
                    far_id: be_u32(&v[0..4]),
                    apply_action: ApplyAction::try_from(v[4]).map_err(|_| bad_value())?,
                    destination: DestinationInterface::try_from(be_u32(&v[5..9]))
                        .map_err(|_| bad_value())?,
                    outer_ip: ipv4_at(&v[9..13]),
                    outer_port: u16::from_be_bytes([v[13], v[14]]),
                })
            }
            ie_type::OUTER_HEADER_CREATION => {
                let v = fixed(6)?;
                Ie::OuterHeaderCreation(OuterHeaderCreation {
                    description: u16::from_be_bytes([v[0], v[1]]),
                    teid: be_u32(&v[2..6]),
                })
            }
            ie_type::UE_IP_ADDRESS => {
                let v = fixed(5)?;
                if v[0] & UE_IP_FLAG_V4 == 0 {
                    return Err(bad_value());
                }
                Ie::UeIpAddress(ipv4_at(&v[1..5]))
            }
            ie_type::USER_ID => Ie::UserId(
                std::str::from_utf8(value)
                    .map_err(|_| bad_value())?
                    .to_string(),
            ),
            ie_type::PDU_SESSION_ID => Ie::PduSessionId(fixed(1)?[0]),
            _ => Ie::Unknown {
                ie_type,
                value: value.to_vec(),
            },
        };
        Ok(ie)
    }
}

/// Decode a run of TLV-encoded IEs that exactly fills `bytes`.
pub fn decode_ies(bytes: &[u8]) -> Result<Vec<Ie>, DecodeError> {
    let mut ies = vec![];
    let mut offset = 0;
    while offset < bytes.len() {
        let Some(tl) = bytes.get(offset..offset + IE_HEADER_LEN) else {
            return Err(DecodeError::TruncatedIe { offset });
        };
        let ie_type = u16::from_be_bytes([tl[0], tl[1]]);
        let length = u16::from_be_bytes([tl[2], tl[3]]) as usize;
        let value_start = offset + IE_HEADER_LEN;
        let Some(value) = bytes.get(value_start..value_start + length) else {
            return Err(DecodeError::TruncatedIe { offset });
        };
        ies.push(Ie::decode(ie_type, value)?);
        offset = value_start + length;
    }
    Ok(ies)
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn ipv4_at(bytes: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])
}
