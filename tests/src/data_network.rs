//! data_network - plays the N6 side.  Sends packets towards UEs and collects
//! decapsulated uplink packets.

use anyhow::{Result, ensure};
use async_channel::Receiver;
use async_std::future;
use pnet_packet::Packet;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet_packet::udp::{MutableUdpPacket, UdpPacket};
use slog::{Logger, info, o};
use std::net::SocketAddrV4;
use std::time::Duration;
use upf::{Ingress, Upf};

const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// Build an IPv4/UDP packet with a valid IP header checksum.  The UDP checksum is left as 0.
pub fn ipv4_udp_packet(src: SocketAddrV4, dst: SocketAddrV4, payload: &[u8]) -> Vec<u8> {
    let total_len = IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len();
    let mut packet = vec![0u8; total_len];

    let mut ip = MutableIpv4Packet::new(&mut packet).unwrap();
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length(total_len as u16);
    ip.set_ttl(64);
    ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
    ip.set_source(*src.ip());
    ip.set_destination(*dst.ip());
    let checksum = ipv4::checksum(&ip.to_immutable());
    ip.set_checksum(checksum);

    let mut udp = MutableUdpPacket::new(&mut packet[IPV4_HEADER_LEN..]).unwrap();
    udp.set_source(src.port());
    udp.set_destination(dst.port());
    udp.set_length((UDP_HEADER_LEN + payload.len()) as u16);
    udp.set_payload(payload);
    packet
}

pub struct DataNetwork {
    upf: Upf,
    uplink: Receiver<Vec<u8>>,
    logger: Logger,
}

impl DataNetwork {
    pub fn new(upf: Upf, uplink: Receiver<Vec<u8>>, logger: &Logger) -> Self {
        DataNetwork {
            upf,
            uplink,
            logger: logger.new(o!("dn" => 1)),
        }
    }

    /// Send a UDP packet from a server in the DN to a UE.
    pub fn send_n6_udp_packet(&self, server: SocketAddrV4, ue: SocketAddrV4, payload: &[u8]) -> Result<()> {
        ensure!(
            self.upf
                .ingress(Ingress::Downlink(ipv4_udp_packet(server, ue, payload))),
            "UPF refused downlink packet"
        );
        info!(self.logger, "Sent in N6 packet to {ue}");
        Ok(())
    }

    /// Receive an uplink packet and return its UDP source, destination and payload.
    pub async fn receive_n6_udp_packet(&self) -> Result<(SocketAddrV4, SocketAddrV4, Vec<u8>)> {
        let packet = future::timeout(Duration::from_secs(5), self.uplink.recv()).await??;
        info!(&self.logger, ">> Uplink packet from UE");

        let ip = Ipv4Packet::new(&packet).ok_or_else(|| anyhow::anyhow!("Short IP packet"))?;
        ensure!(ip.get_version() == 4, "Not IPv4");
        ensure!(
            ip.get_next_level_protocol() == IpNextHeaderProtocols::Udp,
            "Not UDP"
        );
        let udp = UdpPacket::new(ip.payload()).ok_or_else(|| anyhow::anyhow!("Short UDP packet"))?;
        Ok((
            SocketAddrV4::new(ip.get_source(), udp.get_source()),
            SocketAddrV4::new(ip.get_destination(), udp.get_destination()),
            udp.payload().to_vec(),
        ))
    }

    /// Check that nothing is forwarded to the DN in the next short while.
    pub async fn expect_no_uplink(&self) -> Result<()> {
        let result = future::timeout(Duration::from_millis(200), self.uplink.recv()).await;
        ensure!(result.is_err(), "Unexpected uplink packet");
        Ok(())
    }
}
