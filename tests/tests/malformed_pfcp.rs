use pfcp::{Cause, Ie, MessageType, PfcpMessage};
use std::net::Ipv4Addr;
use upf_tests::{UeParams, framework::*};

#[async_std::test]
async fn malformed_pfcp() -> anyhow::Result<()> {
    let (smf, upf, _gnb, _dn, _logger) = init().await?;
    let ue = UeParams::new("imsi-005", Ipv4Addr::new(10, 0, 0, 7), GNB, 0x500);

    // Truncated establishment request
    let request = smf.establishment_request(&ue);
    let bytes = request.encode()?;
    smf.send_bytes(&bytes[..bytes.len() - 3]).await?;
    let response = smf.receive().await?;
    assert_eq!(response.message_type(), MessageType::SessionEstablishmentResponse);
    assert_eq!(response.cause(), Some(Cause::Invalid));
    assert_eq!(response.sequence(), request.sequence());
    assert!(upf.session_table().is_empty());

    // Too short to have a header
    smf.send_bytes(&[0x21, 0x01, 0x00]).await?;
    smf.expect_no_response().await?;

    // Establishment without a UE IP address
    let request = PfcpMessage {
        ies: request
            .ies
            .iter()
            .filter(|ie| !matches!(ie, Ie::UeIpAddress(_)))
            .cloned()
            .collect(),
        ..request
    };
    let response = smf.request(&request).await?;
    assert_eq!(response.cause(), Some(Cause::Invalid));
    assert!(upf.session_table().is_empty());

    // The UPF still serves well-formed requests
    establish_session(&smf, &upf, &ue).await?;

    upf.graceful_shutdown().await;
    Ok(())
}

#[async_std::test]
async fn request_for_unknown_session() -> anyhow::Result<()> {
    let (smf, upf, _gnb, _dn, _logger) = init().await?;
    let sequence = smf.next_sequence();
    let request = PfcpMessage::new(
        MessageType::SessionModificationRequest,
        Some(0x1234),
        sequence,
    );
    let response = smf.request(&request).await?;
    assert_eq!(response.cause(), Some(Cause::Invalid));
    assert_eq!(response.seid(), Some(0));
    assert_eq!(response.sequence(), sequence);

    upf.graceful_shutdown().await;
    Ok(())
}

#[async_std::test]
async fn unsupported_request_is_rejected() -> anyhow::Result<()> {
    let (smf, upf, _gnb, _dn, _logger) = init().await?;

    // Association Setup Request
    let sequence = smf.next_sequence();
    let request = PfcpMessage::new(MessageType::Other(5), None, sequence);
    let response = smf.request(&request).await?;
    assert_eq!(response.message_type(), MessageType::Other(6));
    assert_eq!(response.cause(), Some(Cause::Invalid));
    assert_eq!(response.sequence(), sequence);

    // An unsolicited response gets nothing back
    let message = PfcpMessage::new(MessageType::Other(6), None, smf.next_sequence());
    smf.send(&message).await?;
    smf.expect_no_response().await?;

    upf.graceful_shutdown().await;
    Ok(())
}
