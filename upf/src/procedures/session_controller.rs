//! session_controller - PFCP entry point.  Runs each request through its procedure and
//! turns failures into Cause=Invalid responses.
use super::heartbeat::HeartbeatProcedure;
use super::session_deletion::SessionDeletionProcedure;
use super::session_establishment::SessionEstablishmentProcedure;
use super::session_modification::SessionModificationProcedure;
use super::HandlerApi;
use crate::data::SessionState;
use derive_deref::Deref;
use pfcp::{Cause, Ie, MessageType, NodeId, PfcpHeader, PfcpMessage};
use slog::{Logger, info, warn};
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("{request} not allowed for session in state {state:?}")]
    InvalidTransition {
        state: Option<SessionState>,
        request: MessageType,
    },
    #[error("{cause:?} - {reason}")]
    Cause { cause: Cause, reason: String },
}

impl ControlError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ControlError::Cause {
            cause: Cause::Invalid,
            reason: reason.into(),
        }
    }
}

/// A response to send to the SMF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcpResponse {
    pub message: PfcpMessage,
    /// A session to activate once the response has been sent.
    pub activate: Option<u64>,
}

#[derive(Clone, Deref)]
pub struct SessionController<A: HandlerApi>(A);

impl<A: HandlerApi> SessionController<A> {
    pub fn new(api: A) -> Self {
        SessionController(api)
    }

    /// Handle one PFCP message from `peer`.  Returns the response to send, if any.
    pub fn handle_message(
        &self,
        bytes: &[u8],
        peer: SocketAddr,
        logger: &Logger,
    ) -> Option<PfcpResponse> {
        let request = match PfcpMessage::decode(bytes) {
            Ok(request) => request,
            Err(e) => {
                // Reject it if there is enough of a header to correlate the rejection.
                let Some(header) = PfcpHeader::peek(bytes) else {
                    warn!(logger, "Undecodable PFCP message from {peer} - {e}");
                    return None;
                };
                warn!(
                    logger,
                    "Failed to decode {} from {peer} - {e}", header.message_type
                );
                return self.rejection(header.message_type, header.seid, None, header.sequence);
            }
        };

        let message_type = request.message_type();
        let result = match message_type {
            MessageType::HeartbeatRequest => {
                Ok(HeartbeatProcedure::new(&self.0, logger).run(&request, peer))
            }
            MessageType::SessionEstablishmentRequest => {
                SessionEstablishmentProcedure::new(&self.0, logger).run(&request, peer)
            }
            MessageType::SessionModificationRequest => {
                SessionModificationProcedure::new(&self.0, logger).run(&request)
            }
            MessageType::SessionDeletionRequest => {
                SessionDeletionProcedure::new(&self.0, logger).run(&request)
            }
            _ if message_type.response_type().is_none() => {
                warn!(logger, "Ignoring unexpected {message_type} from {peer}");
                return None;
            }
            _ => Err(ControlError::invalid("unsupported request")),
        };

        result
            .inspect_err(|e| warn!(logger, "{message_type} from {peer} rejected - {e}"))
            .ok()
            .or_else(|| {
                self.rejection(
                    message_type,
                    request.seid(),
                    request.f_seid().map(|f| f.seid),
                    request.sequence(),
                )
            })
    }

    /// Called once a response has been handed to the transport.
    pub fn response_sent(&self, response: &PfcpResponse, logger: &Logger) {
        let Some(seid) = response.activate else {
            return;
        };
        if let Some(session) = self.sessions().lookup_by_seid(seid) {
            match session.transition(SessionState::Establishing, SessionState::Active) {
                Ok(()) => info!(logger, "Session {session} active"),
                Err(state) => warn!(logger, "Session {session} in state {state:?} not activated"),
            }
        }
    }

    /// Called if a response could not be sent.  A session that the SMF was never told
    /// about is removed.
    pub fn response_not_sent(&self, response: &PfcpResponse, logger: &Logger) {
        let Some(seid) = response.activate else {
            return;
        };
        if let Some(session) = self.sessions().lookup_by_seid(seid)
            && session
                .transition(SessionState::Establishing, SessionState::Deleting)
                .is_ok()
        {
            self.sessions().remove(seid);
            warn!(logger, "Removed session {session} after failing to respond");
        }
    }

    /// Delete sessions that have had no PFCP contact for longer than the configured
    /// idle timeout.  Returns the number deleted.
    pub fn expire_idle_sessions(&self, now: Instant, logger: &Logger) -> usize {
        let Some(timeout) = self.config().session_idle_timeout() else {
            return 0;
        };
        let mut expired = 0;
        for session in self.sessions().sessions() {
            if now.saturating_duration_since(session.last_contact()) < timeout {
                continue;
            }
            let deleting = [SessionState::Active, SessionState::Establishing]
                .into_iter()
                .any(|from| session.transition(from, SessionState::Deleting).is_ok());
            if deleting {
                self.sessions().remove(session.seid);
                info!(logger, "Deleted idle session {session}, {:?}", session.stats);
                expired += 1;
            }
        }
        expired
    }

    // A Cause=Invalid response to a request of type `request_type`.
    fn rejection(
        &self,
        request_type: MessageType,
        header_seid: Option<u64>,
        cp_seid: Option<u64>,
        sequence: u32,
    ) -> Option<PfcpResponse> {
        let response_type = request_type.response_type()?;

        // Address the SMF's side of the session where we know it, and otherwise SEID 0.
        let seid = match request_type {
            MessageType::SessionEstablishmentRequest => Some(cp_seid.unwrap_or(0)),
            session if session.is_session_message() => Some(
                header_seid
                    .and_then(|seid| self.sessions().lookup_by_seid(seid))
                    .map_or(0, |s| s.cp_seid),
            ),
            _ => None,
        };

        let mut message = PfcpMessage::new(response_type, seid, sequence);
        if request_type == MessageType::SessionEstablishmentRequest {
            message = message.with_ie(Ie::NodeId(NodeId::Ipv4(self.config().node_ip)));
        }
        Some(PfcpResponse {
            message: message.with_ie(Ie::Cause(Cause::Invalid)),
            activate: None,
        })
    }
}
