use std::net::Ipv4Addr;
use upf::downlink_counter_indices::*;
use upf_tests::{UeParams, framework::*};

#[async_std::test]
async fn downlink_sequence_numbers() -> anyhow::Result<()> {
    let (smf, upf, gnb, dn, _logger) = init().await?;
    let ue_ip = Ipv4Addr::new(10, 0, 0, 8);
    let ue = UeParams::new("imsi-006", ue_ip, GNB, 0x600);
    let session = establish_session(&smf, &upf, &ue).await?;
    let installed = upf.session_table().lookup_by_seid(session.up_seid).unwrap();
    let start = installed.dl_sequence();

    for n in 1..=20u16 {
        let packet = pass_through_downlink_ipv4(&dn, &gnb, ue_ip).await?;
        assert_eq!(packet.sequence, Some(start.wrapping_add(n)));
    }
    assert_eq!(installed.dl_sequence(), start.wrapping_add(20));
    wait_for_stats(&upf, |s| s.downlink[DL_TX_PKTS] == 20).await?;

    upf.graceful_shutdown().await;
    Ok(())
}
