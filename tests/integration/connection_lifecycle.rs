//! Connection lifecycle through the proxy
//!
//! Handshake, payload relayed to the mock relay and echoed back, and both
//! ways a connection can end: a client close and a client reset.

use std::time::Duration;

use tunnel_tcp::upstream::Request;
use tunnel_tcp::wire::tcp_flags::{ACK, FIN, PSH, RST};
use tunnel_tcp::TcpState;

use super::harness::{test_config, Harness};

const CLIENT_ISN: u32 = 1000;

#[tokio::test]
async fn test_handshake_opens_connection() {
    let mut harness = Harness::new(&test_config());

    harness.handshake(40_001, CLIENT_ISN).await;
    harness.assert_silent(Duration::from_millis(50)).await;

    assert_eq!(harness.proxy.connection_count(), 1);
    let stats = harness.proxy.stats();
    assert_eq!(stats.connections_opened, 1);
    assert_eq!(stats.tcp, 2);
    assert_eq!(
        harness.proxy.engine_stats().packets_in_state(TcpState::SynReceived),
        1
    );
}

#[tokio::test]
async fn test_payload_round_trip() {
    let mut harness = Harness::new(&test_config());
    let iss = harness.handshake(40_002, CLIENT_ISN).await;
    let server_next = iss.add(1).value();

    harness
        .send(40_002, CLIENT_ISN + 1, server_next, ACK | PSH, b"hello")
        .await;

    let ack = harness.reply().await;
    assert_eq!(ack.flags, ACK);
    assert_eq!(ack.acknowledgement_number.value(), CLIENT_ISN + 6);
    assert!(ack.payload.is_empty());

    let request = harness.relay_request().await;
    assert_eq!(request, Request::Exchange(bytes::Bytes::from_static(b"hello")));

    let echo = harness.reply().await;
    assert_eq!(echo.flags, ACK | PSH);
    assert_eq!(echo.sequence_number.value(), server_next);
    assert_eq!(echo.acknowledgement_number.value(), CLIENT_ISN + 6);
    assert_eq!(echo.payload.as_ref(), b"hello");

    // Acknowledge the echo so nothing is retransmitted
    harness
        .send(40_002, CLIENT_ISN + 6, server_next + 5, ACK, &[])
        .await;
    harness.assert_silent(Duration::from_millis(50)).await;

    let stats = harness.proxy.stats();
    assert_eq!(stats.bytes_from_clients, 5);
    assert_eq!(stats.bytes_to_clients, 5);
}

#[tokio::test]
async fn test_client_close_closes_relay_and_connection() {
    let mut harness = Harness::new(&test_config());
    let iss = harness.handshake(40_003, CLIENT_ISN).await;
    let server_next = iss.add(1).value();

    harness
        .send(40_003, CLIENT_ISN + 1, server_next, FIN | ACK, &[])
        .await;

    let ack = harness.reply().await;
    assert_eq!(ack.flags, ACK);
    assert_eq!(ack.acknowledgement_number.value(), CLIENT_ISN + 2);

    // The pump sends its close request once the relay has stayed silent
    assert_eq!(harness.relay_request().await, Request::Close);

    let fin = harness.reply().await;
    assert_eq!(fin.flags, FIN | ACK);
    assert_eq!(fin.sequence_number.value(), server_next);

    harness
        .send(40_003, CLIENT_ISN + 2, server_next + 1, ACK, &[])
        .await;
    harness.wait_until_empty().await;

    let stats = harness.proxy.stats();
    assert_eq!(stats.connections_opened, 1);
    assert_eq!(stats.connections_closed, 1);
}

#[tokio::test]
async fn test_reply_after_client_close_is_delivered() {
    let mut harness = Harness::delayed(&test_config());
    let iss = harness.handshake(40_008, CLIENT_ISN).await;
    let server_next = iss.add(1).value();

    harness
        .send(40_008, CLIENT_ISN + 1, server_next, FIN | ACK | PSH, b"ping")
        .await;

    let ack = harness.reply().await;
    assert_eq!(ack.flags, ACK);
    assert_eq!(ack.acknowledgement_number.value(), CLIENT_ISN + 6);

    let reply = harness.reply().await;
    assert_eq!(reply.flags, ACK | PSH);
    assert_eq!(reply.sequence_number.value(), server_next);
    assert_eq!(reply.payload.as_ref(), b"ping");

    assert_eq!(
        harness.relay_request().await,
        Request::Exchange(bytes::Bytes::from_static(b"ping"))
    );
    assert_eq!(harness.relay_request().await, Request::Close);

    let fin = harness.reply().await;
    assert_eq!(fin.flags, FIN | ACK);
    assert_eq!(fin.sequence_number.value(), server_next + 4);

    harness
        .send(40_008, CLIENT_ISN + 6, server_next + 5, ACK, &[])
        .await;
    harness.wait_until_empty().await;
}

#[tokio::test]
async fn test_client_reset_releases_connection() {
    let mut harness = Harness::new(&test_config());
    harness.handshake(40_004, CLIENT_ISN).await;
    assert_eq!(harness.proxy.connection_count(), 1);

    harness.send(40_004, CLIENT_ISN + 1, 0, RST, &[]).await;
    harness.wait_until_empty().await;
    harness.assert_silent(Duration::from_millis(50)).await;

    assert_eq!(harness.proxy.stats().connections_closed, 1);
}

#[tokio::test]
async fn test_connections_are_independent() {
    let mut harness = Harness::new(&test_config());
    harness.handshake(40_005, CLIENT_ISN).await;
    harness.handshake(40_006, 7_000).await;
    assert_eq!(harness.proxy.connection_count(), 2);

    harness.send(40_005, CLIENT_ISN + 1, 0, RST, &[]).await;
    timeout_until(|| harness.proxy.connection_count() == 1).await;
    assert!(harness.proxy.table().identities().iter().all(|id| id.local_port == 40_006));
}

#[tokio::test]
async fn test_shutdown_aborts_connections() {
    let mut harness = Harness::new(&test_config());
    harness.handshake(40_007, CLIENT_ISN).await;

    harness.proxy.shutdown();
    harness.wait_until_empty().await;
}

async fn timeout_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should become true");
}
