//! downlink_pipeline - N6 inner packet to N3 GTP-U tunnel packet
use super::ipv4::{self, Ipv4Error, OUTER_HEADERS_LEN};
use super::{CoreId, DropReason, Egress, PacketSink, claim};
use crate::data::{LookupError, SessionTable, UeSession};
use atomic_counter::{AtomicCounter, RelaxedCounter};
use derive_deref::Deref;
use gtpu::{GTPU_HEADER_LEN, GTPU_OPTIONAL_FIELDS_LEN, GtpuFrame};
use pfcp::ApplyAction;
use slog::{Logger, debug};
use std::net::SocketAddrV4;
use std::sync::Arc;

pub mod downlink_counter_indices {
    pub const DL_RX_PKTS: usize = 0;
    pub const DL_RX_BYTES: usize = 1;
    pub const DL_TX_PKTS: usize = 2;
    pub const DL_TX_BYTES: usize = 3;
    // Drops from here onwards.
    pub const DL_DROP_TOO_SHORT: usize = 4;
    pub const DL_DROP_NOT_IPV4: usize = 5;
    pub const DL_DROP_BAD_LENGTH: usize = 6;
    pub const DL_DROP_NO_SESSION: usize = 7;
    pub const DL_DROP_AFFINITY_MISMATCH: usize = 8;
    pub const DL_DROP_FAR_DROP: usize = 9;
    pub const DL_DROP_FAR_BUFFER: usize = 10;
    pub const DL_DROP_TOO_LONG: usize = 11;
    pub const DL_DROP_SINK_FULL: usize = 12;
    pub const DL_DROP_OTHER: usize = 13;
    pub const DL_NUM_COUNTERS: usize = 14;
}
use downlink_counter_indices::*;

#[derive(Deref)]
pub struct DownlinkCounters([RelaxedCounter; DL_NUM_COUNTERS]);

impl Default for DownlinkCounters {
    fn default() -> Self {
        DownlinkCounters(std::array::from_fn(|_| RelaxedCounter::new(0)))
    }
}

pub struct DownlinkPipeline {
    sessions: SessionTable,
    core: CoreId,
    n3_addr: SocketAddrV4,
    counters: Arc<DownlinkCounters>,
    logger: Logger,
}

impl DownlinkPipeline {
    pub fn new(
        sessions: SessionTable,
        core: CoreId,
        n3_addr: SocketAddrV4,
        counters: Arc<DownlinkCounters>,
        logger: Logger,
    ) -> Self {
        DownlinkPipeline {
            sessions,
            core,
            n3_addr,
            counters,
            logger,
        }
    }

    /// Process one packet from the data network and hand the result to `sink`.
    pub fn handle(&self, packet: &[u8], sink: &dyn PacketSink) {
        self.counters[DL_RX_PKTS].inc();
        self.counters[DL_RX_BYTES].add(packet.len());

        match self.process(packet) {
            Ok((session, egress)) => {
                let len = egress.len();
                if sink.transmit(egress) {
                    session.record_tx(len);
                    self.counters[DL_TX_PKTS].inc();
                    self.counters[DL_TX_BYTES].add(len);
                } else {
                    self.counters[DL_DROP_SINK_FULL].inc();
                }
            }
            Err(reason) => {
                self.counters[drop_counter(reason)].inc();
                debug!(self.logger, "Drop downlink packet - {reason}");
            }
        }
    }

    pub fn process(&self, packet: &[u8]) -> Result<(Arc<UeSession>, Egress), DropReason> {
        // Find the session from the destination address of the inner packet.
        let inner = ipv4::parse_ipv4(packet).map_err(DropReason::InnerPacket)?;
        let session = claim(self.sessions.lookup_by_ue_ip(inner.dst), self.core)
            .map_err(DropReason::Lookup)?;

        let rules = session.rules();
        if rules.far_action != ApplyAction::Forward {
            return Err(DropReason::FarAction(rules.far_action));
        }

        // Drop an oversized packet before it uses up a sequence number.
        let len =
            OUTER_HEADERS_LEN + GTPU_HEADER_LEN + GTPU_OPTIONAL_FIELDS_LEN + inner.bytes.len();
        if len > u16::MAX as usize {
            return Err(DropReason::Packet(Ipv4Error::TooLong(len)));
        }

        // Leave room for the outer headers, then add the GTP-U header and inner packet.
        let frame = GtpuFrame::new(
            rules.teid_downlink,
            Some(session.next_dl_sequence()),
            inner.bytes,
        );
        let mut buf = Vec::with_capacity(OUTER_HEADERS_LEN + frame.encoded_len());
        buf.resize(OUTER_HEADERS_LEN, 0);
        frame.encode_into(&mut buf).map_err(DropReason::Encode)?;

        let gnb = rules.gnb_addr();
        ipv4::write_outer_headers(&mut buf, self.n3_addr, gnb, inner.tos)
            .map_err(DropReason::Packet)?;

        Ok((session, Egress::Ran { gnb, packet: buf }))
    }
}

fn drop_counter(reason: DropReason) -> usize {
    match reason {
        DropReason::InnerPacket(Ipv4Error::TooShort(_)) => DL_DROP_TOO_SHORT,
        DropReason::InnerPacket(Ipv4Error::NotIpv4(_)) => DL_DROP_NOT_IPV4,
        DropReason::InnerPacket(_) => DL_DROP_BAD_LENGTH,
        DropReason::Lookup(LookupError::NoSession) => DL_DROP_NO_SESSION,
        DropReason::Lookup(LookupError::AffinityMismatch) => DL_DROP_AFFINITY_MISMATCH,
        DropReason::FarAction(ApplyAction::Buffer) => DL_DROP_FAR_BUFFER,
        DropReason::FarAction(_) => DL_DROP_FAR_DROP,
        DropReason::Packet(Ipv4Error::TooLong(_)) | DropReason::Encode(_) => DL_DROP_TOO_LONG,
        DropReason::Packet(_)
        | DropReason::WrongPort(_)
        | DropReason::Gtpu(_)
        | DropReason::GnbAddressMismatch(_) => DL_DROP_OTHER,
    }
}
