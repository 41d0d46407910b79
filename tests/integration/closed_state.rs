//! Packets that never reach an open connection
//!
//! Unknown identities are answered as RFC 793's CLOSED state would answer
//! them, and refused connections get a reset for their SYN.

use std::time::Duration;

use tunnel_tcp::wire::tcp_flags::{ACK, RST, SYN};
use tunnel_tcp::{EngineConfig, PacketError, ProxyError};

use super::harness::{client_packet, test_config, Harness};

#[tokio::test]
async fn test_ack_for_unknown_connection_is_reset() {
    let mut harness = Harness::new(&test_config());

    harness.send(41_001, 5_000, 7_000, ACK, &[]).await;

    let reset = harness.reply().await;
    assert_eq!(reset.flags, RST);
    assert_eq!(reset.sequence_number.value(), 7_000);
    assert_eq!(reset.identity.remote_port, 41_001);
    assert_eq!(harness.proxy.connection_count(), 0);
    assert_eq!(harness.proxy.stats().resets_sent, 1);
}

#[tokio::test]
async fn test_rst_for_unknown_connection_is_ignored() {
    let mut harness = Harness::new(&test_config());

    harness.send(41_002, 5_000, 0, RST, &[]).await;

    harness.assert_silent(Duration::from_millis(100)).await;
    assert_eq!(harness.proxy.connection_count(), 0);
    assert_eq!(harness.proxy.stats().resets_sent, 0);
}

#[tokio::test]
async fn test_bare_payload_for_unknown_connection_is_dropped() {
    let mut harness = Harness::new(&test_config());

    harness.send(41_003, 5_000, 0, 0, b"stray").await;

    harness.assert_silent(Duration::from_millis(100)).await;
    assert_eq!(harness.proxy.connection_count(), 0);
}

#[tokio::test]
async fn test_connect_failure_resets_syn() {
    let mut harness = Harness::failing(&test_config());

    harness.send(41_004, 9_000, 0, SYN, &[]).await;

    let reset = harness.reply().await;
    assert_eq!(reset.flags, RST | ACK);
    assert_eq!(reset.sequence_number.value(), 0);
    assert_eq!(reset.acknowledgement_number.value(), 9_001);

    harness.wait_until_empty().await;
    let stats = harness.proxy.stats();
    assert_eq!(stats.connections_opened, 1);
    assert_eq!(stats.connections_closed, 1);
}

#[tokio::test]
async fn test_full_table_refuses_syn() {
    let config = EngineConfig {
        max_connections: 1,
        ..test_config()
    };
    let mut harness = Harness::new(&config);
    harness.handshake(41_005, 1_000).await;

    let syn = client_packet(41_006, 3_000, 0, SYN, &[]);
    let result = harness.proxy.process_inbound_packet(&syn).await;
    assert!(matches!(result, Err(ProxyError::TableFull(1))));

    let reset = harness.reply().await;
    assert_eq!(reset.flags, RST | ACK);
    assert_eq!(reset.acknowledgement_number.value(), 3_001);
    assert_eq!(reset.identity.remote_port, 41_006);

    let stats = harness.proxy.stats();
    assert_eq!(stats.connections_rejected, 1);
    assert_eq!(harness.proxy.connection_count(), 1);
}

#[tokio::test]
async fn test_malformed_packets_are_rejected() {
    let harness = Harness::new(&test_config());

    let truncated = harness.proxy.process_inbound_packet(&[0x45, 0x00, 0x00]).await;
    assert!(matches!(
        truncated,
        Err(ProxyError::Packet(PacketError::BadIpv4Packet(_)))
    ));

    let mut corrupted = client_packet(41_007, 1, 0, SYN, &[]).to_vec();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xff;
    let corrupted = harness.proxy.process_inbound_packet(&corrupted).await;
    assert!(matches!(
        corrupted,
        Err(ProxyError::Packet(PacketError::BadChecksum(_)))
    ));

    let stats = harness.proxy.stats();
    assert_eq!(stats.messages, 2);
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.tcp, 0);
    assert_eq!(harness.proxy.connection_count(), 0);
}
