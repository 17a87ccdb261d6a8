use pfcp::{Cause, MessageType};
use std::net::{Ipv4Addr, SocketAddrV4};
use upf::SessionState;
use upf::downlink_counter_indices::*;
use upf::uplink_counter_indices::*;
use upf_tests::{UeParams, framework::*};

#[async_std::test]
async fn establishment() -> anyhow::Result<()> {
    let (smf, upf, gnb, dn, _logger) = init().await?;
    let ue_ip = Ipv4Addr::new(10, 0, 0, 2);

    // SMF establishes the session
    let ue = UeParams::new("imsi-001", ue_ip, GNB, 0x87654321);
    let session = establish_session(&smf, &upf, &ue).await?;
    assert_eq!(session.n3_ip, Some(N3_IP));
    assert_ne!(session.teid_uplink, 0);

    let installed = upf.session_table().lookup_by_ue_ip(ue_ip).unwrap();
    assert_eq!(installed.supi, "imsi-001");
    assert_eq!(installed.cp_seid, session.cp_seid);
    assert_eq!(installed.teid_uplink, session.teid_uplink);

    // Downlink is tunneled to the gNB
    let packet = pass_through_downlink_ipv4(&dn, &gnb, ue_ip).await?;
    assert_eq!(packet.gnb, GNB);
    assert_eq!(packet.outer_dst, GNB);
    assert_eq!(packet.outer_src, SocketAddrV4::new(N3_IP, 2153));
    assert_eq!(packet.teid, 0x87654321);
    assert_eq!(packet.sequence, Some(1));

    // Uplink is detunneled to the DN
    pass_through_uplink_ipv4(&gnb, &dn, &session, ue_ip).await?;
    assert_eq!(installed.ul_sequence(), 1);
    assert_eq!(installed.state(), SessionState::Active);

    let stats = wait_for_stats(&upf, |s| {
        s.uplink[UL_TX_PKTS] == 1 && s.downlink[DL_TX_PKTS] == 1
    })
    .await?;
    assert_eq!(stats.downlink[DL_RX_PKTS], 1);

    // A second establishment for the same UE IP is refused
    let request = smf.establishment_request(&ue);
    let response = smf.request(&request).await?;
    assert_eq!(response.message_type(), MessageType::SessionEstablishmentResponse);
    assert_eq!(response.cause(), Some(Cause::Invalid));
    assert_eq!(response.seid(), request.f_seid().map(|f| f.seid));
    assert_eq!(upf.session_table().len(), 1);

    upf.graceful_shutdown().await;
    Ok(())
}
