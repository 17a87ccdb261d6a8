//! session_modification - the SMF changes the rules of an active session

use super::session_establishment::qos_priority;
use super::{ControlError, HandlerApi, PfcpResponse, Procedure};
use crate::data::{SessionRules, SessionState, UeSession};
use derive_deref::{Deref, DerefMut};
use gtpu::GTPU_PORT;
use pfcp::{
    Cause, DestinationInterface, Ie, MessageType, OUTER_HEADER_CREATION_GTPU_UDP_IPV4,
    PfcpMessage,
};
use slog::{Logger, info};
use std::time::Instant;

#[derive(Deref, DerefMut)]
pub struct SessionModificationProcedure<'a, A: HandlerApi>(Procedure<'a, A>);

impl<'a, A: HandlerApi> SessionModificationProcedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        SessionModificationProcedure(Procedure::new(api, logger))
    }

    // Session Modification Procedure
    // 1.    Pfcp SessionModificationRequest >>
    // 2.    Update the session rules
    // 3.    Pfcp SessionModificationResponse <<
    pub fn run(&self, r: &PfcpMessage) -> Result<PfcpResponse, ControlError> {
        self.log_message(">> SessionModificationRequest");
        let request = MessageType::SessionModificationRequest;
        let seid = r.seid().ok_or_else(|| self.missing_ie(request, "SEID"))?;
        let session = self
            .sessions()
            .lookup_by_seid(seid)
            .ok_or(ControlError::InvalidTransition {
                state: None,
                request,
            })?;
        session.touch(Instant::now());

        session
            .transition(SessionState::Active, SessionState::Modifying)
            .map_err(|state| ControlError::InvalidTransition {
                state: Some(state),
                request,
            })?;
        let result = self.apply(&session, r);
        // Nothing else moves a session out of Modifying.
        let _ = session.transition(SessionState::Modifying, SessionState::Active);
        result?;

        let response = PfcpMessage::new(
            MessageType::SessionModificationResponse,
            Some(session.cp_seid),
            r.sequence(),
        )
        .with_ie(Ie::Cause(Cause::Accepted));
        self.log_message("<< SessionModificationResponse");
        Ok(PfcpResponse {
            message: response,
            activate: None,
        })
    }

    fn apply(&self, session: &UeSession, r: &PfcpMessage) -> Result<(), ControlError> {
        // Validate everything before changing anything.
        if let Some(ue_ip) = r.ue_ip_address()
            && ue_ip != session.ue_ip
        {
            return Err(ControlError::invalid(format!(
                "UE IP of {session} cannot change to {ue_ip}"
            )));
        }
        if let Some(f_teid) = r.f_teid()
            && (f_teid.choose || f_teid.teid != session.teid_uplink)
        {
            return Err(ControlError::invalid(format!(
                "Uplink TEID of {session} cannot change"
            )));
        }
        let far = r
            .create_fars()
            .find(|far| far.destination == DestinationInterface::Ran)
            .cloned();
        let ohc = r.outer_header_creation();
        if let Some(ohc) = &ohc
            && ohc.description != OUTER_HEADER_CREATION_GTPU_UDP_IPV4
        {
            return Err(ControlError::invalid(format!(
                "Unsupported outer header creation {:#06x}",
                ohc.description
            )));
        }
        let priority = r.precedence().map(qos_priority).transpose()?;
        let mbr = r.mbr();
        let pdu_session_id = r.pdu_session_id();

        let rules = self
            .sessions()
            .update(session.seid, |rules: &mut SessionRules| {
                if let Some(far) = far {
                    rules.gnb_ip = far.outer_ip;
                    rules.gnb_port = if far.outer_port == 0 {
                        GTPU_PORT
                    } else {
                        far.outer_port
                    };
                    rules.far_action = far.apply_action;
                }
                if let Some(ohc) = ohc {
                    rules.teid_downlink = ohc.teid;
                }
                if let Some(priority) = priority {
                    rules.qos_priority = priority;
                }
                if let Some(mbr) = mbr {
                    rules.qos_mbr_ul = mbr.uplink;
                    rules.qos_mbr_dl = mbr.downlink;
                }
                if let Some(id) = pdu_session_id {
                    rules.pdu_session_id = id;
                }
                *rules
            })
            .map_err(|e| ControlError::invalid(e.to_string()))?;

        info!(
            self.logger,
            "Modified session {}, gNB {}-{:#010x} {:?}",
            session,
            rules.gnb_addr(),
            rules.teid_downlink,
            rules.far_action
        );
        Ok(())
    }
}
