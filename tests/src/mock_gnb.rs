//! mock_gnb - plays the gNB on the N3 reference point

use crate::ipv4_udp_packet;
use anyhow::{Result, anyhow, ensure};
use async_channel::Receiver;
use async_std::future;
use gtpu::{GTPU_PORT, GtpuFrame};
use pnet_packet::Packet;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{self, Ipv4Packet};
use pnet_packet::udp::UdpPacket;
use slog::{Logger, info, o};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use upf::{Ingress, Upf};

/// A downlink GTP-U packet as it left the UPF.
#[derive(Debug)]
pub struct DownlinkPacket {
    pub gnb: SocketAddrV4,
    pub outer_src: SocketAddrV4,
    pub outer_dst: SocketAddrV4,
    pub tos: u8,
    pub teid: u32,
    pub sequence: Option<u16>,
    pub inner: Vec<u8>,
}

pub struct MockGnb {
    upf: Upf,
    n3_ip: Ipv4Addr,
    downlink: Receiver<(SocketAddrV4, Vec<u8>)>,
    logger: Logger,
}

impl MockGnb {
    pub fn new(
        upf: Upf,
        n3_ip: Ipv4Addr,
        downlink: Receiver<(SocketAddrV4, Vec<u8>)>,
        logger: &Logger,
    ) -> Self {
        MockGnb {
            upf,
            n3_ip,
            downlink,
            logger: logger.new(o!("gnb" => 1)),
        }
    }

    /// Tunnel `inner` to the UPF from `gnb`.
    pub fn send_n3_data_packet(
        &self,
        gnb: SocketAddrV4,
        teid: u32,
        sequence: Option<u16>,
        inner: &[u8],
    ) -> Result<()> {
        let frame = GtpuFrame::new(teid, sequence, inner).encode()?;
        self.send_n3_packet(ipv4_udp_packet(
            gnb,
            SocketAddrV4::new(self.n3_ip, GTPU_PORT),
            &frame,
        ))?;
        info!(self.logger, "Sent N3 packet on TEID {teid:#010x}");
        Ok(())
    }

    /// Send a raw outer packet.
    pub fn send_n3_packet(&self, packet: Vec<u8>) -> Result<()> {
        ensure!(
            self.upf.ingress(Ingress::Uplink(packet)),
            "UPF refused uplink packet"
        );
        Ok(())
    }

    pub async fn receive_n3_data_packet(&self) -> Result<DownlinkPacket> {
        let (gnb, packet) =
            future::timeout(Duration::from_secs(5), self.downlink.recv()).await??;
        info!(self.logger, ">> Downlink packet for {gnb}");

        let ip = Ipv4Packet::new(&packet).ok_or_else(|| anyhow!("Short outer IP packet"))?;
        ensure!(ip.get_version() == 4, "Not IPv4");
        ensure!(
            ip.get_total_length() as usize == packet.len(),
            "Outer IP length {} for packet of {} bytes",
            ip.get_total_length(),
            packet.len()
        );
        ensure!(
            ip.get_checksum() == ipv4::checksum(&ip),
            "Bad outer IP header checksum"
        );
        ensure!(
            ip.get_next_level_protocol() == IpNextHeaderProtocols::Udp,
            "Outer packet not UDP"
        );
        let udp = UdpPacket::new(ip.payload()).ok_or_else(|| anyhow!("Short UDP packet"))?;
        let frame = gtpu::decode(udp.payload())?;

        Ok(DownlinkPacket {
            gnb,
            outer_src: SocketAddrV4::new(ip.get_source(), udp.get_source()),
            outer_dst: SocketAddrV4::new(ip.get_destination(), udp.get_destination()),
            tos: (ip.get_dscp() << 2) | ip.get_ecn(),
            teid: frame.teid,
            sequence: frame.sequence,
            inner: frame.payload.to_vec(),
        })
    }

    /// Check that nothing is sent towards the RAN in the next short while.
    pub async fn expect_no_downlink(&self) -> Result<()> {
        let result = future::timeout(Duration::from_millis(200), self.downlink.recv()).await;
        ensure!(result.is_err(), "Unexpected downlink packet");
        Ok(())
    }
}
