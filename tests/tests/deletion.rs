use pfcp::{Cause, MessageType};
use std::net::{Ipv4Addr, SocketAddrV4};
use upf::downlink_counter_indices::*;
use upf_tests::{UeParams, framework::*};

#[async_std::test]
async fn deletion() -> anyhow::Result<()> {
    let (smf, upf, gnb, dn, _logger) = init().await?;
    let ue_ip = Ipv4Addr::new(10, 0, 0, 6);
    let ue = UeParams::new("imsi-004", ue_ip, GNB, 0x400);
    let session = establish_session(&smf, &upf, &ue).await?;
    pass_through_downlink_ipv4(&dn, &gnb, ue_ip).await?;

    let response = smf.delete_session(session.up_seid).await?;
    assert_eq!(response.message_type(), MessageType::SessionDeletionResponse);
    assert_eq!(response.cause(), Some(Cause::Accepted));
    assert_eq!(response.seid(), Some(session.cp_seid));
    assert!(upf.session_table().is_empty());

    // Nothing more is forwarded for the UE
    dn.send_n6_udp_packet(DN_SERVER, SocketAddrV4::new(ue_ip, 23215), &[0; 4])?;
    wait_for_stats(&upf, |s| s.downlink[DL_DROP_NO_SESSION] == 1).await?;
    gnb.expect_no_downlink().await?;

    // Deleting again is rejected
    let response = smf.delete_session(session.up_seid).await?;
    assert_eq!(response.cause(), Some(Cause::Invalid));
    assert_eq!(response.seid(), Some(0));

    // The UE IP can be reused
    let session = establish_session(&smf, &upf, &ue).await?;
    assert_eq!(upf.session_table().len(), 1);
    assert!(upf.session_table().lookup_by_seid(session.up_seid).is_some());

    upf.graceful_shutdown().await;
    Ok(())
}
