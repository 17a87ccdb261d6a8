//! main - starts a UPF serving PFCP on N4 and forwarding between N3 and N6

use anyhow::{Context, Result, ensure};
use async_std::channel::Sender;
use async_std::prelude::*;
use clap::Parser;
use signal_hook::consts::signal::*;
use signal_hook_async_std::Signals;
use slog::{Drain, Logger, info, o};
use std::net::{IpAddr, Ipv4Addr};
use upf::{Config, GnbAddressPolicy, Upf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file.  Options given on the command line override its settings.
    #[arg(long)]
    config: Option<String>,

    /// Local IPv4 address for N4.  The UPF serves PFCP on this address and
    /// uses it as its Node ID.  Defaults to the eth0 address.
    #[arg(long)]
    node_ip: Option<Ipv4Addr>,

    /// UDP port for PFCP.
    #[arg(long)]
    pfcp_port: Option<u16>,

    /// Local IPv4 address for N3.  GTP-U is received on UDP port 2152 of this
    /// address.  Defaults to the node IP.
    #[arg(long)]
    n3_ip: Option<Ipv4Addr>,

    /// Name of the Linux tun device to open for routing userplane packet to/from UEs on the N6 reference point.
    #[arg(long)]
    n6_tun_name: Option<String>,

    /// Number of forwarding worker threads.
    #[arg(long)]
    num_workers: Option<u16>,

    /// Pin each worker thread to its own CPU.
    #[arg(long)]
    pin_workers: bool,

    /// Whether to drop uplink packets from an unexpected gNB address.
    #[arg(long, value_enum)]
    gnb_address_policy: Option<GnbAddressPolicy>,

    /// Delete sessions that the SMF has not mentioned for this many seconds.  0 disables.
    #[arg(long)]
    session_idle_timeout_secs: Option<u64>,

    /// Log packet counters every this many seconds.  0 disables.
    #[arg(long)]
    stats_interval_secs: Option<u64>,
}

#[async_std::main]
async fn main() -> Result<()> {
    exit_on_panic();
    let logger = init_logging();

    let args = Args::parse();
    let config = build_config(args, &logger)?;
    check_local_ip(&config.node_ip, "node IP")?;
    check_local_ip(&config.n3_ip, "N3 IP")?;
    ensure!(config.num_workers > 0, "At least one worker is needed");
    info!(
        &logger,
        "Node {}, N3 {}, {} workers",
        config.node_ip,
        config.n3_ip,
        config.num_workers
    );

    let upf = Upf::start(config, logger).await?;

    wait_for_signal().await?;
    upf.graceful_shutdown().await;

    Ok(())
}

fn build_config(args: Args, logger: &Logger) -> Result<Config> {
    let mut config = match &args.config {
        Some(filename) => upf::load_config_file(filename, logger)?,
        None => {
            let node_ip = match args.node_ip {
                Some(ip) => ip,
                None => default_local_ip()?,
            };
            Config {
                node_ip,
                n3_ip: node_ip,
                ..Config::default()
            }
        }
    };
    if let Some(node_ip) = args.node_ip {
        config.node_ip = node_ip;
    }
    if let Some(n3_ip) = args.n3_ip {
        config.n3_ip = n3_ip;
    }
    if let Some(pfcp_port) = args.pfcp_port {
        config.pfcp_port = pfcp_port;
    }
    if let Some(n6_tun_name) = args.n6_tun_name {
        config.n6_tun_name = n6_tun_name;
    }
    if let Some(num_workers) = args.num_workers {
        config.num_workers = num_workers;
    }
    if args.pin_workers {
        config.pin_workers = true;
    }
    if let Some(policy) = args.gnb_address_policy {
        config.gnb_address_policy = policy;
    }
    if let Some(secs) = args.session_idle_timeout_secs {
        config.session_idle_timeout_secs = secs;
    }
    if let Some(secs) = args.stats_interval_secs {
        config.stats_interval_secs = secs;
    }
    Ok(config)
}

fn default_local_ip() -> Result<Ipv4Addr> {
    match local_ip_address::local_ip().context("No local IP address - use --node-ip")? {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => anyhow::bail!("Local IP {ip} is not IPv4 - use --node-ip"),
    }
}

fn init_logging() -> Logger {
    // Use info level logging by default
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info") }
    }
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

fn exit_on_panic() {
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));
}

fn check_local_ip(ip: &Ipv4Addr, what: &str) -> Result<()> {
    ensure!(
        !ip.is_unspecified(),
        "Unspecific IP address 0.0.0.0 not allowed for {what} - this must be an address that peers can send to"
    );
    Ok(())
}

async fn wait_for_signal() -> Result<i32> {
    let signals = Signals::new([SIGHUP, SIGTERM, SIGINT, SIGQUIT])?;
    let handle = signals.handle();
    let (sig_sender, sig_receiver) = async_std::channel::unbounded();
    let signals_task = async_std::task::spawn(handle_signals(signals, sig_sender));
    let signal = sig_receiver.recv().await;
    handle.close();
    signals_task.await;
    Ok(signal?)
}

async fn handle_signals(signals: Signals, sig_sender: Sender<i32>) {
    let mut signals = signals.fuse();
    while let Some(signal) = signals.next().await {
        match signal {
            // Config is not reloaded.
            SIGHUP => {}
            SIGTERM | SIGINT | SIGQUIT => {
                let _ = sig_sender.send(signal).await;
            }
            _ => {}
        }
    }
}
