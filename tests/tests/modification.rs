use pfcp::{ApplyAction, Cause};
use std::net::{Ipv4Addr, SocketAddrV4};
use upf::downlink_counter_indices::*;
use upf_tests::{UeParams, framework::*};

#[async_std::test]
async fn modification() -> anyhow::Result<()> {
    let (smf, upf, gnb, dn, _logger) = init().await?;
    let ue_ip = Ipv4Addr::new(10, 0, 0, 3);
    let ue = UeParams::new("imsi-002", ue_ip, GNB, 0x100);
    let session = establish_session(&smf, &upf, &ue).await?;
    pass_through_downlink_ipv4(&dn, &gnb, ue_ip).await?;

    // UE hands over to another gNB
    let new_gnb = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 101), 2152);
    let response = smf.modify_session(&session, new_gnb, 0x200).await?;
    assert_eq!(response.cause(), Some(Cause::Accepted));
    assert_eq!(response.seid(), Some(session.cp_seid));

    let packet = pass_through_downlink_ipv4(&dn, &gnb, ue_ip).await?;
    assert_eq!(packet.gnb, new_gnb);
    assert_eq!(packet.teid, 0x200);
    // Sequence numbering carries on across the change
    assert_eq!(packet.sequence, Some(2));

    // Downlink is suspended
    let response = smf
        .set_far_action(&session, new_gnb, ApplyAction::Drop)
        .await?;
    assert_eq!(response.cause(), Some(Cause::Accepted));
    dn.send_n6_udp_packet(DN_SERVER, SocketAddrV4::new(ue_ip, 23215), &[0; 4])?;
    wait_for_stats(&upf, |s| s.downlink[DL_DROP_FAR_DROP] == 1).await?;
    gnb.expect_no_downlink().await?;

    // ... and resumed
    smf.set_far_action(&session, new_gnb, ApplyAction::Forward)
        .await?;
    pass_through_downlink_ipv4(&dn, &gnb, ue_ip).await?;

    upf.graceful_shutdown().await;
    Ok(())
}

#[async_std::test]
async fn modification_cannot_move_ue_ip() -> anyhow::Result<()> {
    let (smf, upf, _gnb, _dn, _logger) = init().await?;
    let ue = UeParams::new("imsi-003", Ipv4Addr::new(10, 0, 0, 4), GNB, 0x300);
    let session = establish_session(&smf, &upf, &ue).await?;

    let request = pfcp::PfcpMessage::new(
        pfcp::MessageType::SessionModificationRequest,
        Some(session.up_seid),
        smf.next_sequence(),
    )
    .with_ie(pfcp::Ie::UeIpAddress(Ipv4Addr::new(10, 0, 0, 5)));
    let response = smf.request(&request).await?;
    assert_eq!(response.cause(), Some(Cause::Invalid));

    // The session is unharmed
    let installed = upf.session_table().lookup_by_seid(session.up_seid).unwrap();
    assert_eq!(installed.ue_ip, Ipv4Addr::new(10, 0, 0, 4));
    assert_eq!(installed.state(), upf::SessionState::Active);

    upf.graceful_shutdown().await;
    Ok(())
}
