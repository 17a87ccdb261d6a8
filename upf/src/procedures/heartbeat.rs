//! heartbeat - PFCP path liveness, which also keeps the SMF's sessions alive

use super::{HandlerApi, PfcpResponse, Procedure};
use derive_deref::{Deref, DerefMut};
use pfcp::{Ie, MessageType, PfcpMessage};
use slog::{Logger, debug};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Deref, DerefMut)]
pub struct HeartbeatProcedure<'a, A: HandlerApi>(Procedure<'a, A>);

impl<'a, A: HandlerApi> HeartbeatProcedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        HeartbeatProcedure(Procedure::new(api, logger))
    }

    // Heartbeat Procedure
    // 1.    Pfcp HeartbeatRequest >>
    // 2.    Pfcp HeartbeatResponse <<
    pub fn run(&self, r: &PfcpMessage, peer: SocketAddr) -> PfcpResponse {
        self.log_message(">> HeartbeatRequest");

        let now = Instant::now();
        let mut refreshed = 0;
        for session in self.sessions().sessions() {
            if session.smf_addr.ip() == peer.ip() {
                session.touch(now);
                refreshed += 1;
            }
        }
        debug!(self.logger, "Heartbeat from {peer} refreshed {refreshed} sessions");

        let response = PfcpMessage::new(MessageType::HeartbeatResponse, None, r.sequence())
            .with_ie(Ie::RecoveryTimeStamp(self.recovery_time_stamp()));
        self.log_message("<< HeartbeatResponse");
        PfcpResponse {
            message: response,
            activate: None,
        }
    }
}
