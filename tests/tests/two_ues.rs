use std::net::{Ipv4Addr, SocketAddrV4};
use upf::uplink_counter_indices::*;
use upf_tests::{UeParams, framework::*};

#[async_std::test]
async fn two_ues() -> anyhow::Result<()> {
    let (smf, upf, gnb, dn, _logger) = init().await?;
    let gnb_2 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 102), 2152);

    // UE 1 PDU session
    let ue_ip_1 = Ipv4Addr::new(10, 0, 1, 1);
    let ue_1 = UeParams::new("imsi-101", ue_ip_1, GNB, 0x1001);
    let session_1 = establish_session(&smf, &upf, &ue_1).await?;

    // UE 2 PDU session, on another gNB
    let ue_ip_2 = Ipv4Addr::new(10, 0, 1, 2);
    let ue_2 = UeParams::new("imsi-102", ue_ip_2, gnb_2, 0x1002);
    let session_2 = establish_session(&smf, &upf, &ue_2).await?;

    assert_ne!(session_1.up_seid, session_2.up_seid);
    assert_ne!(session_1.teid_uplink, session_2.teid_uplink);
    assert_eq!(upf.session_table().len(), 2);

    // Each UE's downlink goes down its own tunnel
    let packet = pass_through_downlink_ipv4(&dn, &gnb, ue_ip_2).await?;
    assert_eq!((packet.gnb, packet.teid), (gnb_2, 0x1002));
    let packet = pass_through_downlink_ipv4(&dn, &gnb, ue_ip_1).await?;
    assert_eq!((packet.gnb, packet.teid), (GNB, 0x1001));

    // Uplink for both
    pass_through_uplink_ipv4(&gnb, &dn, &session_1, ue_ip_1).await?;

    // Sent from the first gNB rather than UE 2's, so counted but still forwarded.
    pass_through_uplink_ipv4(&gnb, &dn, &session_2, ue_ip_2).await?;
    let stats = wait_for_stats(&upf, |s| s.uplink[UL_TX_PKTS] == 2).await?;
    assert_eq!(stats.uplink[UL_GNB_ADDR_MISMATCH], 1);

    // Deleting one leaves the other
    smf.delete_session(session_1.up_seid).await?;
    pass_through_downlink_ipv4(&dn, &gnb, ue_ip_2).await?;

    upf.graceful_shutdown().await;
    Ok(())
}
