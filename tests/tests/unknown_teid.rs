use std::net::{Ipv4Addr, SocketAddrV4};
use upf::uplink_counter_indices::*;
use upf_tests::{framework::*, ipv4_udp_packet};

#[async_std::test]
async fn unknown_teid() -> anyhow::Result<()> {
    let (_smf, upf, gnb, dn, _logger) = init().await?;

    // No session has TEID 0xDEADBEEF
    let inner = ipv4_udp_packet(
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 23215),
        DN_SERVER,
        &[0; 10],
    );
    gnb.send_n3_data_packet(GNB, 0xDEADBEEF, None, &inner)?;

    let stats = wait_for_stats(&upf, |s| s.uplink[UL_DROP_NO_SESSION] == 1).await?;
    assert_eq!(stats.uplink[UL_RX_PKTS], 1);
    assert_eq!(stats.uplink[UL_TX_PKTS], 0);
    dn.expect_no_uplink().await?;

    upf.graceful_shutdown().await;
    Ok(())
}

#[async_std::test]
async fn not_gtpu() -> anyhow::Result<()> {
    let (_smf, upf, gnb, dn, _logger) = init().await?;

    // Arrives on N3 but to the wrong port
    gnb.send_n3_packet(ipv4_udp_packet(GNB, SocketAddrV4::new(N3_IP, 2153), &[0x30; 12]))?;
    // Right port, GTPv2 flags
    gnb.send_n3_packet(ipv4_udp_packet(
        GNB,
        SocketAddrV4::new(N3_IP, 2152),
        &[0x48, 0xff, 0, 4, 0, 0, 0, 1, 0, 0, 0, 0],
    ))?;

    let stats = wait_for_stats(&upf, |s| s.uplink[UL_RX_PKTS] == 2).await?;
    assert_eq!(stats.uplink[UL_DROP_WRONG_PORT], 1);
    assert_eq!(stats.uplink[UL_DROP_GTP_BAD_VERSION], 1);
    dn.expect_no_uplink().await?;

    upf.graceful_shutdown().await;
    Ok(())
}
