mod handler_api;
mod heartbeat;
mod procedure;
mod session_controller;
mod session_deletion;
mod session_establishment;
mod session_modification;

pub use handler_api::HandlerApi;
pub use procedure::Procedure;
pub use session_controller::{ControlError, PfcpResponse, SessionController};
pub use session_establishment::{DEFAULT_PDU_SESSION_ID, DEFAULT_QOS_PRIORITY};
