mod data;
mod pfcp_server;
mod procedures;
mod upf;
mod userplane;

pub use data::{
    Config, GnbAddressPolicy, SessionRules, SessionState, SessionTable, UeSession,
    load_config_file,
};
pub use procedures::{DEFAULT_PDU_SESSION_ID, DEFAULT_QOS_PRIORITY};
pub use upf::Upf;
pub use userplane::{
    ChannelSink, CoreId, Egress, FlowKey, FlowSteering, Ingress, PacketSink, UserplaneStats,
    downlink_counter_indices, uplink_counter_indices,
};
