use super::{DataNetwork, DownlinkPacket, MockGnb, MockSmf, SmfSession, UeParams};
use anyhow::{Result, bail, ensure};
use async_std::task;
use slog::{Drain, Logger, o};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use upf::{ChannelSink, Config, Egress, SessionState, Upf, UserplaneStats};

pub const N3_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
pub const GNB: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 100), 2152);
pub const DN_SERVER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 53);
const TEST_UDP_PORT: u16 = 23215;

pub async fn init() -> Result<(MockSmf, Upf, MockGnb, DataNetwork, Logger)> {
    init_with(test_config()).await
}

pub fn test_config() -> Config {
    Config {
        node_ip: Ipv4Addr::LOCALHOST,
        pfcp_port: 0,
        n3_ip: N3_IP,
        num_workers: 2,
        stats_interval_secs: 0,
        ..Config::default()
    }
}

/// Start a UPF whose forwarded packets go to a mock gNB and a mock DN instead of the kernel.
pub async fn init_with(config: Config) -> Result<(MockSmf, Upf, MockGnb, DataNetwork, Logger)> {
    exit_on_panic();
    let logger = init_logging();
    let n3_ip = config.n3_ip;

    let (egress_tx, egress_rx) = async_channel::bounded(1024);
    let upf = Upf::start_with_sink(
        config,
        Arc::new(ChannelSink(egress_tx)),
        logger.new(o!("upf" => 1)),
    )
    .await?;

    // Split what the UPF sends by direction.
    let (ran_tx, ran_rx) = async_channel::unbounded();
    let (dn_tx, dn_rx) = async_channel::unbounded();
    task::spawn(async move {
        while let Ok(egress) = egress_rx.recv().await {
            let _ = match egress {
                Egress::Ran { gnb, packet } => ran_tx.send((gnb, packet)).await.map_err(drop),
                Egress::DataNetwork { packet } => dn_tx.send(packet).await.map_err(drop),
            };
        }
    });

    let smf = MockSmf::new(upf.pfcp_addr(), &logger).await?;
    let gnb = MockGnb::new(upf.clone(), n3_ip, ran_rx, &logger);
    let dn = DataNetwork::new(upf.clone(), dn_rx, &logger);
    Ok((smf, upf, gnb, dn, logger))
}

fn exit_on_panic() {
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));
}

fn init_logging() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build();
    let drain = std::sync::Mutex::new(drain).fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

/// Send a downlink packet from the DN to an arbitrary UDP port on the UE and receive it at the gNB.
pub async fn pass_through_downlink_ipv4(
    dn: &DataNetwork,
    gnb: &MockGnb,
    ue_ip: Ipv4Addr,
) -> Result<DownlinkPacket> {
    let ue = SocketAddrV4::new(ue_ip, TEST_UDP_PORT);
    dn.send_n6_udp_packet(DN_SERVER, ue, &[0x42; 10])?;
    let packet = gnb.receive_n3_data_packet().await?;
    ensure!(
        packet.inner == crate::ipv4_udp_packet(DN_SERVER, ue, &[0x42; 10]),
        "Inner packet changed in transit"
    );
    Ok(packet)
}

/// Send an uplink packet from the UE through the gNB and receive it in the DN.
pub async fn pass_through_uplink_ipv4(
    gnb: &MockGnb,
    dn: &DataNetwork,
    session: &SmfSession,
    ue_ip: Ipv4Addr,
) -> Result<()> {
    let ue = SocketAddrV4::new(ue_ip, TEST_UDP_PORT);
    let inner = crate::ipv4_udp_packet(ue, DN_SERVER, &[0x43; 10]);
    gnb.send_n3_data_packet(GNB, session.teid_uplink, Some(1), &inner)?;
    let (src, dst, payload) = dn.receive_n6_udp_packet().await?;
    ensure!(src == ue && dst == DN_SERVER, "Uplink packet {src} -> {dst}");
    ensure!(payload == [0x43; 10], "Uplink payload changed in transit");
    Ok(())
}

/// Poll the UPF's packet counters until `done` is satisfied.
pub async fn wait_for_stats(
    upf: &Upf,
    done: impl Fn(&UserplaneStats) -> bool,
) -> Result<UserplaneStats> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = upf.userplane_stats();
        if done(&stats) {
            return Ok(stats);
        }
        if Instant::now() > deadline {
            bail!("Timed out waiting for counters - {stats:?}");
        }
        task::sleep(Duration::from_millis(10)).await;
    }
}

/// Establish a session and wait for the UPF to activate it.  Activation happens just
/// after the response is sent, so the SMF can see the response first.
pub async fn establish_session(smf: &MockSmf, upf: &Upf, ue: &UeParams) -> Result<SmfSession> {
    let session = smf.establish_session(ue).await?;
    let deadline = Instant::now() + Duration::from_secs(5);
    while upf
        .session_table()
        .lookup_by_seid(session.up_seid)
        .is_none_or(|s| s.state() != SessionState::Active)
    {
        ensure!(Instant::now() < deadline, "Session {} not activated", ue.supi);
        task::sleep(Duration::from_millis(10)).await;
    }
    Ok(session)
}
