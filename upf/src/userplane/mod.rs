mod downlink_pipeline;
mod flow_steering;
mod ipv4;
mod kernel_io;
mod packet_processor;
mod uplink_pipeline;
mod worker;

use crate::data::{LookupError, UeSession};
use ipv4::Ipv4Error;
use pfcp::ApplyAction;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use thiserror::Error;

pub use downlink_pipeline::{DownlinkPipeline, downlink_counter_indices};
pub use flow_steering::{CoreId, FlowKey, FlowSteering};
pub use kernel_io::KernelIo;
pub use packet_processor::{PacketProcessor, UserplaneStats, dump_stats};
pub use uplink_pipeline::{UplinkPipeline, uplink_counter_indices};

// Largest packet read from either interface.
const MAX_PACKET_LEN: usize = 2000;

/// A packet arriving at the UPF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingress {
    /// An inner IP packet from the data network (N6).
    Downlink(Vec<u8>),
    /// An outer IPv4/UDP/GTP-U packet from a gNB (N3).
    Uplink(Vec<u8>),
}

/// A packet leaving the UPF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Egress {
    /// A complete outer IPv4 packet for a gNB.
    Ran { gnb: SocketAddrV4, packet: Vec<u8> },
    /// An inner IP packet for the data network.
    DataNetwork { packet: Vec<u8> },
}

impl Egress {
    pub fn len(&self) -> usize {
        match self {
            Egress::Ran { packet, .. } | Egress::DataNetwork { packet } => packet.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where the workers send forwarded packets.  Must not block.  Returns false
/// if the packet could not be accepted.
pub trait PacketSink: Send + Sync + 'static {
    fn transmit(&self, egress: Egress) -> bool;
}

/// A sink that queues packets on a bounded channel.
#[derive(Clone)]
pub struct ChannelSink(pub async_channel::Sender<Egress>);

impl PacketSink for ChannelSink {
    fn transmit(&self, egress: Egress) -> bool {
        self.0.try_send(egress).is_ok()
    }
}

/// Why a pipeline dropped a packet.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    #[error("outer packet: {0}")]
    Packet(Ipv4Error),
    #[error("inner packet: {0}")]
    InnerPacket(Ipv4Error),
    #[error("UDP destination port {0} is not GTP-U")]
    WrongPort(u16),
    #[error("GTP-U: {0}")]
    Gtpu(gtpu::DecodeError),
    #[error("{0}")]
    Lookup(LookupError),
    #[error("FAR action {0:?}")]
    FarAction(ApplyAction),
    #[error("outer source {0} is not the session's gNB")]
    GnbAddressMismatch(Ipv4Addr),
    #[error("GTP-U encode: {0}")]
    Encode(gtpu::EncodeError),
}

/// Check that a session found by a pipeline lookup may be used on `core`.
fn claim(session: Option<Arc<UeSession>>, core: CoreId) -> Result<Arc<UeSession>, LookupError> {
    let session = session
        .filter(|s| s.is_forwarding())
        .ok_or(LookupError::NoSession)?;
    if session.affinity_core != Some(core) {
        return Err(LookupError::AffinityMismatch);
    }
    Ok(session)
}
