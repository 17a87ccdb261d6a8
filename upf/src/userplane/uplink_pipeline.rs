//! uplink_pipeline - N3 GTP-U tunnel packet to N6 inner packet
use super::ipv4::{self, Ipv4Error};
use super::{CoreId, DropReason, Egress, PacketSink, claim};
use crate::data::{GnbAddressPolicy, LookupError, SessionTable, UeSession};
use atomic_counter::{AtomicCounter, RelaxedCounter};
use derive_deref::Deref;
use gtpu::GTPU_PORT;
use slog::{Logger, debug};
use std::sync::Arc;

pub mod uplink_counter_indices {
    pub const UL_RX_PKTS: usize = 0;
    pub const UL_RX_BYTES: usize = 1;
    pub const UL_TX_PKTS: usize = 2;
    pub const UL_TX_BYTES: usize = 3;
    // Warnings from here onwards.  The first one is not a drop under the permissive policy.
    pub const UL_GNB_ADDR_MISMATCH: usize = 4;
    pub const UL_DROP_TOO_SHORT: usize = 5;
    pub const UL_DROP_NOT_IPV4: usize = 6;
    pub const UL_DROP_BAD_LENGTH: usize = 7;
    pub const UL_DROP_NOT_UDP: usize = 8;
    pub const UL_DROP_WRONG_PORT: usize = 9;
    pub const UL_DROP_GTP_TOO_SHORT: usize = 10;
    pub const UL_DROP_GTP_BAD_VERSION: usize = 11;
    pub const UL_DROP_GTP_MESSAGE_TYPE: usize = 12;
    pub const UL_DROP_GTP_BAD_LENGTH: usize = 13;
    pub const UL_DROP_NO_SESSION: usize = 14;
    pub const UL_DROP_AFFINITY_MISMATCH: usize = 15;
    pub const UL_DROP_GNB_ADDR_MISMATCH: usize = 16;
    pub const UL_DROP_BAD_INNER_PACKET: usize = 17;
    pub const UL_DROP_SINK_FULL: usize = 18;
    pub const UL_DROP_OTHER: usize = 19;
    pub const UL_NUM_COUNTERS: usize = 20;
}
use uplink_counter_indices::*;

#[derive(Deref)]
pub struct UplinkCounters([RelaxedCounter; UL_NUM_COUNTERS]);

impl Default for UplinkCounters {
    fn default() -> Self {
        UplinkCounters(std::array::from_fn(|_| RelaxedCounter::new(0)))
    }
}

pub struct UplinkPipeline {
    sessions: SessionTable,
    core: CoreId,
    gnb_address_policy: GnbAddressPolicy,
    counters: Arc<UplinkCounters>,
    logger: Logger,
}

impl UplinkPipeline {
    pub fn new(
        sessions: SessionTable,
        core: CoreId,
        gnb_address_policy: GnbAddressPolicy,
        counters: Arc<UplinkCounters>,
        logger: Logger,
    ) -> Self {
        UplinkPipeline {
            sessions,
            core,
            gnb_address_policy,
            counters,
            logger,
        }
    }

    /// Process one packet from a gNB and hand the result to `sink`.
    pub fn handle(&self, packet: &[u8], sink: &dyn PacketSink) {
        self.counters[UL_RX_PKTS].inc();
        self.counters[UL_RX_BYTES].add(packet.len());

        match self.process(packet) {
            Ok((session, egress)) => {
                let len = egress.len();
                if sink.transmit(egress) {
                    session.record_rx(len);
                    self.counters[UL_TX_PKTS].inc();
                    self.counters[UL_TX_BYTES].add(len);
                } else {
                    self.counters[UL_DROP_SINK_FULL].inc();
                }
            }
            Err(reason) => {
                self.counters[drop_counter(reason)].inc();
                debug!(self.logger, "Drop uplink packet - {reason}");
            }
        }
    }

    pub fn process(&self, packet: &[u8]) -> Result<(Arc<UeSession>, Egress), DropReason> {
        let outer = ipv4::parse_udp_datagram(packet).map_err(DropReason::Packet)?;
        if outer.dst.port() != GTPU_PORT {
            return Err(DropReason::WrongPort(outer.dst.port()));
        }
        let frame = gtpu::decode(outer.payload).map_err(DropReason::Gtpu)?;
        let session = claim(self.sessions.lookup_by_teid(frame.teid), self.core)
            .map_err(DropReason::Lookup)?;

        let gnb_ip = session.rules().gnb_ip;
        if *outer.src.ip() != gnb_ip {
            self.counters[UL_GNB_ADDR_MISMATCH].inc();
            match self.gnb_address_policy {
                GnbAddressPolicy::Permissive => debug!(
                    self.logger,
                    "Uplink for {} from {} but gNB is {}",
                    session,
                    outer.src.ip(),
                    gnb_ip
                ),
                GnbAddressPolicy::Strict => {
                    return Err(DropReason::GnbAddressMismatch(*outer.src.ip()));
                }
            }
        }

        let inner = ipv4::parse_ipv4(frame.payload).map_err(DropReason::InnerPacket)?;
        if let Some(sequence) = frame.sequence {
            session.record_ul_sequence(sequence);
        }
        Ok((
            session,
            Egress::DataNetwork {
                packet: inner.bytes.to_vec(),
            },
        ))
    }
}

fn drop_counter(reason: DropReason) -> usize {
    match reason {
        DropReason::Packet(Ipv4Error::TooShort(_)) => UL_DROP_TOO_SHORT,
        DropReason::Packet(Ipv4Error::NotIpv4(_)) => UL_DROP_NOT_IPV4,
        DropReason::Packet(Ipv4Error::NotUdp(_)) => UL_DROP_NOT_UDP,
        DropReason::Packet(_) => UL_DROP_BAD_LENGTH,
        DropReason::WrongPort(_) => UL_DROP_WRONG_PORT,
        DropReason::Gtpu(gtpu::DecodeError::TooShort(_)) => UL_DROP_GTP_TOO_SHORT,
        DropReason::Gtpu(gtpu::DecodeError::BadVersion(_)) => UL_DROP_GTP_BAD_VERSION,
        DropReason::Gtpu(gtpu::DecodeError::UnsupportedType(_)) => UL_DROP_GTP_MESSAGE_TYPE,
        DropReason::Gtpu(gtpu::DecodeError::BadLength { .. }) => UL_DROP_GTP_BAD_LENGTH,
        DropReason::Lookup(LookupError::NoSession) => UL_DROP_NO_SESSION,
        DropReason::Lookup(LookupError::AffinityMismatch) => UL_DROP_AFFINITY_MISMATCH,
        DropReason::GnbAddressMismatch(_) => UL_DROP_GNB_ADDR_MISMATCH,
        DropReason::InnerPacket(_) => UL_DROP_BAD_INNER_PACKET,
        DropReason::FarAction(_) | DropReason::Encode(_) => UL_DROP_OTHER,
    }
}
