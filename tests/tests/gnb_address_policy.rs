use std::net::{Ipv4Addr, SocketAddrV4};
use upf::GnbAddressPolicy;
use upf::uplink_counter_indices::*;
use upf_tests::{UeParams, framework::*, ipv4_udp_packet};

const SPOOFER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 9, 9), 2152);

#[async_std::test]
async fn strict_policy_drops_uplink_from_wrong_gnb() -> anyhow::Result<()> {
    let (smf, upf, gnb, dn, _logger) = init_with(upf::Config {
        gnb_address_policy: GnbAddressPolicy::Strict,
        ..test_config()
    })
    .await?;
    let ue_ip = Ipv4Addr::new(10, 0, 2, 1);
    let session = establish_session(
        &smf,
        &upf,
        &UeParams::new("imsi-201", ue_ip, GNB, 0x2001),
    )
    .await?;

    let inner = ipv4_udp_packet(SocketAddrV4::new(ue_ip, 1000), DN_SERVER, &[1, 2, 3]);
    gnb.send_n3_data_packet(SPOOFER, session.teid_uplink, None, &inner)?;
    wait_for_stats(&upf, |s| s.uplink[UL_DROP_GNB_ADDR_MISMATCH] == 1).await?;
    dn.expect_no_uplink().await?;

    // The real gNB still gets through
    pass_through_uplink_ipv4(&gnb, &dn, &session, ue_ip).await?;

    upf.graceful_shutdown().await;
    Ok(())
}

#[async_std::test]
async fn permissive_policy_forwards_uplink_from_wrong_gnb() -> anyhow::Result<()> {
    let (smf, upf, gnb, dn, _logger) = init().await?;
    let ue_ip = Ipv4Addr::new(10, 0, 2, 2);
    let session = establish_session(
        &smf,
        &upf,
        &UeParams::new("imsi-202", ue_ip, GNB, 0x2002),
    )
    .await?;

    let inner = ipv4_udp_packet(SocketAddrV4::new(ue_ip, 1000), DN_SERVER, &[1, 2, 3]);
    gnb.send_n3_data_packet(SPOOFER, session.teid_uplink, None, &inner)?;
    let (_, _, payload) = dn.receive_n6_udp_packet().await?;
    assert_eq!(payload, [1, 2, 3]);
    let stats = wait_for_stats(&upf, |s| s.uplink[UL_TX_PKTS] == 1).await?;
    assert_eq!(stats.uplink[UL_GNB_ADDR_MISMATCH], 1);

    upf.graceful_shutdown().await;
    Ok(())
}
