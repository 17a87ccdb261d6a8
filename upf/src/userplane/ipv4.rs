//! ipv4 - just enough IPv4 and UDP to find inner packets and build outer GTP-U headers
#![allow(clippy::unusual_byte_groupings)]

use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const OUTER_HEADERS_LEN: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN;

const IPPROTO_UDP: u8 = 17;
const DEFAULT_TTL: u8 = 64;
const FLAGS_DONT_FRAGMENT: u16 = 0b010_0000000000000;
const CHECKSUM_WORD: usize = 5;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv4Error {
    #[error("packet too short ({0} bytes)")]
    TooShort(usize),
    #[error("not IPv4 (version {0})")]
    NotIpv4(u8),
    #[error("inconsistent header or total length")]
    BadLength,
    #[error("not UDP (protocol {0})")]
    NotUdp(u8),
    #[error("{0} bytes is too long for one IPv4 packet")]
    TooLong(usize),
}

/// An IPv4 packet, trimmed to its total length.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Packet<'a> {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub tos: u8,
    pub protocol: u8,
    pub header_len: usize,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct UdpDatagram<'a> {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub payload: &'a [u8],
}

pub fn parse_ipv4(packet: &[u8]) -> Result<Ipv4Packet<'_>, Ipv4Error> {
    if packet.len() < IPV4_HEADER_LEN {
        return Err(Ipv4Error::TooShort(packet.len()));
    }
    let version = packet[0] >> 4;
    if version != 4 {
        return Err(Ipv4Error::NotIpv4(version));
    }
    let header_len = (packet[0] & 0x0f) as usize * 4;
    let total_len = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    if header_len < IPV4_HEADER_LEN || total_len < header_len {
        return Err(Ipv4Error::BadLength);
    }
    if total_len > packet.len() {
        return Err(Ipv4Error::TooShort(packet.len()));
    }
    Ok(Ipv4Packet {
        src: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
        dst: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
        tos: packet[1],
        protocol: packet[9],
        header_len,
        bytes: &packet[..total_len],
    })
}

pub fn parse_udp_datagram(packet: &[u8]) -> Result<UdpDatagram<'_>, Ipv4Error> {
    let ip = parse_ipv4(packet)?;
    if ip.protocol != IPPROTO_UDP {
        return Err(Ipv4Error::NotUdp(ip.protocol));
    }
    let udp = &ip.bytes[ip.header_len..];
    if udp.len() < UDP_HEADER_LEN {
        return Err(Ipv4Error::TooShort(packet.len()));
    }
    let udp_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
    if udp_len < UDP_HEADER_LEN || udp_len > udp.len() {
        return Err(Ipv4Error::BadLength);
    }
    Ok(UdpDatagram {
        src: SocketAddrV4::new(ip.src, u16::from_be_bytes([udp[0], udp[1]])),
        dst: SocketAddrV4::new(ip.dst, u16::from_be_bytes([udp[2], udp[3]])),
        payload: &udp[UDP_HEADER_LEN..udp_len],
    })
}

/// Cheap read of the destination address, for steering.  No validation.
pub fn peek_destination(packet: &[u8]) -> Option<Ipv4Addr> {
    let dst = packet.get(16..20)?;
    Some(Ipv4Addr::new(dst[0], dst[1], dst[2], dst[3]))
}

/// Fill in the first `OUTER_HEADERS_LEN` bytes of `packet` with IPv4 and UDP
/// headers covering the whole of `packet`.
pub fn write_outer_headers(
    packet: &mut [u8],
    src: SocketAddrV4,
    dst: SocketAddrV4,
    tos: u8,
) -> Result<(), Ipv4Error> {
    let total_len =
        u16::try_from(packet.len()).map_err(|_| Ipv4Error::TooLong(packet.len()))?;
    if packet.len() < OUTER_HEADERS_LEN {
        return Err(Ipv4Error::TooShort(packet.len()));
    }
    let udp_len = total_len - IPV4_HEADER_LEN as u16;

    // ---- IPv4 header, RFC 791 ----
    packet[0] = 0b0100_0101; // version and header length
    packet[1] = tos;
    packet[2..4].copy_from_slice(&total_len.to_be_bytes());
    packet[4..6].copy_from_slice(&[0, 0]); // identification - unused with DF
    packet[6..8].copy_from_slice(&FLAGS_DONT_FRAGMENT.to_be_bytes());
    packet[8] = DEFAULT_TTL;
    packet[9] = IPPROTO_UDP;
    packet[10..12].copy_from_slice(&[0, 0]);
    packet[12..16].copy_from_slice(&src.ip().octets());
    packet[16..20].copy_from_slice(&dst.ip().octets());
    let checksum = pnet_packet::util::checksum(&packet[..IPV4_HEADER_LEN], CHECKSUM_WORD);
    packet[10..12].copy_from_slice(&checksum.to_be_bytes());

    // ---- UDP header, RFC 768.  Zero checksum is allowed over IPv4. ----
    packet[20..22].copy_from_slice(&src.port().to_be_bytes());
    packet[22..24].copy_from_slice(&dst.port().to_be_bytes());
    packet[24..26].copy_from_slice(&udp_len.to_be_bytes());
    packet[26..28].copy_from_slice(&[0, 0]);
    Ok(())
}
