//! session_establishment - the SMF creates a PDU session on the UPF

use super::{ControlError, HandlerApi, PfcpResponse, Procedure};
use crate::data::{NewSession, SessionRules};
use crate::userplane::FlowKey;
use derive_deref::{Deref, DerefMut};
use gtpu::GTPU_PORT;
use pfcp::{
    Cause, DestinationInterface, FSeid, FTeid, Ie, MessageType, NodeId,
    OUTER_HEADER_CREATION_GTPU_UDP_IPV4, PfcpMessage,
};
use slog::{Logger, info};
use std::net::SocketAddr;

// Used when the SMF does not signal them.
pub const DEFAULT_PDU_SESSION_ID: u8 = 1;
pub const DEFAULT_QOS_PRIORITY: u8 = 5;

#[derive(Deref, DerefMut)]
pub struct SessionEstablishmentProcedure<'a, A: HandlerApi>(Procedure<'a, A>);

impl<'a, A: HandlerApi> SessionEstablishmentProcedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        SessionEstablishmentProcedure(Procedure::new(api, logger))
    }

    // Session Establishment Procedure
    // 1.    Pfcp SessionEstablishmentRequest >>
    // 2.    Pfcp SessionEstablishmentResponse <<
    // 3.    Activate the session once the response is on its way
    pub fn run(&self, r: &PfcpMessage, smf_addr: SocketAddr) -> Result<PfcpResponse, ControlError> {
        self.log_message(">> SessionEstablishmentRequest");
        let request = MessageType::SessionEstablishmentRequest;

        r.node_id().ok_or_else(|| self.missing_ie(request, "Node ID"))?;
        let cp_f_seid = r.f_seid().ok_or_else(|| self.missing_ie(request, "F-SEID"))?;
        let ue_ip = r
            .ue_ip_address()
            .ok_or_else(|| self.missing_ie(request, "UE IP Address"))?;
        let f_teid = r.f_teid().ok_or_else(|| self.missing_ie(request, "F-TEID"))?;
        let far = r
            .create_fars()
            .find(|far| far.destination == DestinationInterface::Ran)
            .cloned()
            .ok_or_else(|| self.missing_ie(request, "Create FAR towards RAN"))?;
        let ohc = r
            .outer_header_creation()
            .ok_or_else(|| self.missing_ie(request, "Outer Header Creation"))?;
        let supi = r.user_id().ok_or_else(|| self.missing_ie(request, "User ID"))?;

        if ohc.description != OUTER_HEADER_CREATION_GTPU_UDP_IPV4 {
            return Err(ControlError::invalid(format!(
                "Unsupported outer header creation {:#06x}",
                ohc.description
            )));
        }
        let qos_priority = match r.precedence() {
            Some(precedence) => qos_priority(precedence)?,
            None => DEFAULT_QOS_PRIORITY,
        };
        let mbr = r.mbr();

        // The session belongs to the core that its UE IP steers to.  A TEID chosen here
        // steers to the same core.
        let core = self.steering().core_for(FlowKey::UeIp(ue_ip));
        let teid_uplink = if f_teid.choose {
            self.allocate_uplink_teid(core)
                .ok_or_else(|| ControlError::invalid("No uplink TEID available"))?
        } else if f_teid.teid == 0 {
            return Err(ControlError::invalid("Uplink TEID 0"));
        } else {
            f_teid.teid
        };

        let seid = self.allocate_seid();
        let session = self
            .sessions()
            .insert(NewSession {
                seid,
                cp_seid: cp_f_seid.seid,
                smf_addr,
                supi,
                ue_ip,
                teid_uplink,
                affinity_core: Some(core),
                rules: SessionRules {
                    gnb_ip: far.outer_ip,
                    gnb_port: if far.outer_port == 0 {
                        GTPU_PORT
                    } else {
                        far.outer_port
                    },
                    teid_downlink: ohc.teid,
                    far_action: far.apply_action,
                    pdu_session_id: r.pdu_session_id().unwrap_or(DEFAULT_PDU_SESSION_ID),
                    qos_priority,
                    qos_mbr_ul: mbr.as_ref().map_or(0, |m| m.uplink),
                    qos_mbr_dl: mbr.as_ref().map_or(0, |m| m.downlink),
                },
            })
            .map_err(|e| ControlError::invalid(e.to_string()))?;

        let rules = session.rules();
        info!(
            self.logger,
            "Created session {} on core {}, gNB {}-{:#010x}",
            session,
            core,
            rules.gnb_addr(),
            rules.teid_downlink
        );

        let config = self.config();
        let response = PfcpMessage::new(
            MessageType::SessionEstablishmentResponse,
            Some(cp_f_seid.seid),
            r.sequence(),
        )
        .with_ie(Ie::NodeId(NodeId::Ipv4(config.node_ip)))
        .with_ie(Ie::Cause(Cause::Accepted))
        .with_ie(Ie::FSeid(FSeid {
            seid,
            ipv4: Some(config.node_ip),
        }))
        .with_ie(Ie::FTeid(FTeid {
            teid: teid_uplink,
            ipv4: Some(config.n3_ip),
            choose: false,
        }));
        self.log_message("<< SessionEstablishmentResponse");

        Ok(PfcpResponse {
            message: response,
            activate: Some(seid),
        })
    }
}

/// Precedence is signaled as a u32 but stored as a one byte priority.
pub fn qos_priority(precedence: u32) -> Result<u8, ControlError> {
    u8::try_from(precedence)
        .map_err(|_| ControlError::invalid(format!("Precedence {precedence} out of range")))
}
