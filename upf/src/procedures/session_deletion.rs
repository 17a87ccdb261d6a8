//! session_deletion - the SMF releases a PDU session

use super::{ControlError, HandlerApi, PfcpResponse, Procedure};
use crate::data::SessionState;
use derive_deref::{Deref, DerefMut};
use pfcp::{Cause, Ie, MessageType, PfcpMessage};
use slog::{Logger, info};

#[derive(Deref, DerefMut)]
pub struct SessionDeletionProcedure<'a, A: HandlerApi>(Procedure<'a, A>);

impl<'a, A: HandlerApi> SessionDeletionProcedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        SessionDeletionProcedure(Procedure::new(api, logger))
    }

    // Session Deletion Procedure
    // 1.    Pfcp SessionDeletionRequest >>
    // 2.    Remove the session
    // 3.    Pfcp SessionDeletionResponse <<
    pub fn run(&self, r: &PfcpMessage) -> Result<PfcpResponse, ControlError> {
        self.log_message(">> SessionDeletionRequest");
        let request = MessageType::SessionDeletionRequest;
        let seid = r.seid().ok_or_else(|| self.missing_ie(request, "SEID"))?;
        let session = self
            .sessions()
            .lookup_by_seid(seid)
            .ok_or(ControlError::InvalidTransition {
                state: None,
                request,
            })?;

        // The workers stop forwarding as soon as the state leaves Active.
        session
            .transition(SessionState::Active, SessionState::Deleting)
            .map_err(|state| ControlError::InvalidTransition {
                state: Some(state),
                request,
            })?;
        self.sessions().remove(seid);
        info!(self.logger, "Deleted session {session}, {:?}", session.stats);

        let response = PfcpMessage::new(
            MessageType::SessionDeletionResponse,
            Some(session.cp_seid),
            r.sequence(),
        )
        .with_ie(Ie::Cause(Cause::Accepted));
        self.log_message("<< SessionDeletionResponse");
        Ok(PfcpResponse {
            message: response,
            activate: None,
        })
    }
}
