use anyhow::Result;
use serde::Deserialize;
use slog::{Logger, error, info};
use std::fs;
use std::net::Ipv4Addr;
use std::time::Duration;

/// What to do with an uplink packet whose outer source address is not the
/// gNB address installed for its session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GnbAddressPolicy {
    /// Count and log, then forward anyway.
    #[default]
    Permissive,
    /// Count and drop.
    Strict,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // The N4 address.  PFCP is served on this address and it is signaled as our Node ID.
    pub node_ip: Ipv4Addr,

    // PFCP UDP port.  0 means pick any free port.
    pub pfcp_port: u16,

    // The N3 address.  Source of downlink GTP-U packets, and signaled in uplink F-TEIDs.
    pub n3_ip: Ipv4Addr,

    // Outer UDP source port of downlink GTP-U packets.
    pub gtpu_source_port: u16,

    // Name of the N6 tun device
    pub n6_tun_name: String,

    // Number of forwarding worker threads.  Each session is owned by exactly one.
    pub num_workers: u16,

    // Pin worker N to CPU N.
    pub pin_workers: bool,

    // Packets that can be queued to each worker before the dispatcher starts dropping.
    pub worker_queue_depth: usize,

    pub gnb_address_policy: GnbAddressPolicy,

    // Sessions with no PFCP contact for this long are deleted.  0 disables.
    pub session_idle_timeout_secs: u64,

    // Period of the packet counter log.
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_ip: Ipv4Addr::LOCALHOST,
            pfcp_port: pfcp::PFCP_PORT,
            n3_ip: Ipv4Addr::LOCALHOST,
            gtpu_source_port: 2153,
            n6_tun_name: "ue".to_string(),
            num_workers: 1,
            pin_workers: false,
            worker_queue_depth: 4096,
            gnb_address_policy: GnbAddressPolicy::Permissive,
            session_idle_timeout_secs: 0,
            stats_interval_secs: 5,
        }
    }
}

impl Config {
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        (self.session_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.session_idle_timeout_secs))
    }
}

/// Load the UPF config from a TOML file.  Fields that are absent take their default values.
pub fn load_config_file(filename: &str, logger: &Logger) -> Result<Config> {
    let path = std::env::current_dir()?;
    let contents = fs::read_to_string(filename).inspect_err(|e| {
        error!(
            logger,
            "Failed to load config file {filename} (current directory {}) with error code {e}",
            path.display()
        )
    })?;
    let config: Config = toml::from_str(&contents)?;
    info!(logger, "Loaded config from {filename}");
    Ok(config)
}
