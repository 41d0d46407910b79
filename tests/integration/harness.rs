//! Shared fixtures: a proxy wired to in-memory relays

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing_subscriber::EnvFilter;
use tunnel_tcp::upstream::protocol::{read_request, write_response};
use tunnel_tcp::upstream::{Request, UpstreamStream};
use tunnel_tcp::wire::{build_tcp_packet, parse_packet, TcpHeader, TcpSegment};
use tunnel_tcp::{EngineConfig, Identity, SequenceNumber, TcpProxy, UpstreamConnector, UpstreamError};

pub const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const SERVER: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);
pub const SERVER_PORT: u16 = 80;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine settings with slow retransmission and fast upstream polling and draining
pub fn test_config() -> EngineConfig {
    EngineConfig {
        retransmit_interval_ms: 1000,
        upstream_poll_interval_ms: 5,
        upstream_drain_timeout_ms: 50,
        ..EngineConfig::default()
    }
}

/// Relay that echoes every byte it receives; reports all requests but reads
///
/// A `delayed` relay answers exchanges with nothing and returns the echo on
/// a later read.
async fn echo_relay(mut stream: DuplexStream, log: mpsc::UnboundedSender<Request>, delayed: bool) {
    let mut pending = BytesMut::new();

    while let Ok(Some(request)) = read_request(&mut stream, 1 << 20).await {
        if let Request::Write(data) | Request::Exchange(data) = &request {
            pending.extend_from_slice(data);
        }
        if request.expects_response() {
            let reply = if delayed && request != Request::Read {
                Bytes::new()
            } else {
                pending.split().freeze()
            };
            if write_response(&mut stream, &reply).await.is_err() {
                break;
            }
        }

        let done = request == Request::Close;
        if request != Request::Read {
            let _ = log.send(request);
        }
        if done {
            break;
        }
    }
}

struct MockConnector {
    fail: bool,
    delayed: bool,
    log: mpsc::UnboundedSender<Request>,
}

#[async_trait]
impl UpstreamConnector for MockConnector {
    async fn connect(&self, _identity: &Identity) -> Result<Box<dyn UpstreamStream>, UpstreamError> {
        if self.fail {
            let addr = SocketAddr::from(([127, 0, 0, 1], 9));
            return Err(UpstreamError::connect_failed(addr, "connection refused"));
        }
        let (client, server) = tokio::io::duplex(1 << 20);
        tokio::spawn(echo_relay(server, self.log.clone(), self.delayed));
        Ok(Box::new(client))
    }
}

pub struct Harness {
    pub proxy: TcpProxy,
    pub tunnel: mpsc::Receiver<Bytes>,
    pub relay: mpsc::UnboundedReceiver<Request>,
}

impl Harness {
    pub fn new(config: &EngineConfig) -> Self {
        Self::build(config, false, false)
    }

    /// Harness whose connector refuses every connection
    pub fn failing(config: &EngineConfig) -> Self {
        Self::build(config, true, false)
    }

    /// Harness whose relay echoes only on the read after each exchange
    pub fn delayed(config: &EngineConfig) -> Self {
        Self::build(config, false, true)
    }

    fn build(config: &EngineConfig, fail: bool, delayed: bool) -> Self {
        init_tracing();
        let (log, relay) = mpsc::unbounded_channel();
        let (tunnel_tx, tunnel) = mpsc::channel(256);
        let connector = Arc::new(MockConnector { fail, delayed, log });
        Self {
            proxy: TcpProxy::new(config, connector, tunnel_tx),
            tunnel,
            relay,
        }
    }

    /// Feed a client packet; the result must be `Ok`
    pub async fn send(&self, port: u16, seq: u32, ack: u32, flags: u8, payload: &[u8]) {
        let packet = client_packet(port, seq, ack, flags, payload);
        self.proxy
            .process_inbound_packet(&packet)
            .await
            .expect("packet should be accepted");
    }

    /// Next packet written to the tunnel
    pub async fn reply(&mut self) -> TcpSegment {
        let packet = timeout(REPLY_TIMEOUT, self.tunnel.recv())
            .await
            .expect("timed out waiting for a reply")
            .expect("tunnel closed");
        parse_packet(&packet).expect("reply should be a valid packet")
    }

    pub async fn assert_silent(&mut self, wait: Duration) {
        if let Ok(Some(packet)) = timeout(wait, self.tunnel.recv()).await {
            let segment = parse_packet(&packet).expect("reply should be a valid packet");
            panic!("unexpected reply: {}", segment.flags_string());
        }
    }

    /// Next non-read request seen by the relay
    pub async fn relay_request(&mut self) -> Request {
        timeout(REPLY_TIMEOUT, self.relay.recv())
            .await
            .expect("timed out waiting for the relay")
            .expect("relay log closed")
    }

    pub async fn wait_until_empty(&self) {
        timeout(REPLY_TIMEOUT, async {
            while self.proxy.connection_count() > 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection table should drain");
    }

    /// Complete a three-way handshake; returns the server's initial sequence number
    pub async fn handshake(&mut self, port: u16, client_isn: u32) -> SequenceNumber {
        use tunnel_tcp::wire::tcp_flags::{ACK, SYN};

        self.send(port, client_isn, 0, SYN, &[]).await;
        let syn_ack = self.reply().await;
        assert_eq!(syn_ack.flags, SYN | ACK);
        assert_eq!(syn_ack.acknowledgement_number.value(), client_isn.wrapping_add(1));

        let iss = syn_ack.sequence_number;
        self.send(port, client_isn.wrapping_add(1), iss.add(1).value(), ACK, &[])
            .await;
        iss
    }
}

/// Raw packet from the test client at `port` to the server
pub fn client_packet(port: u16, seq: u32, ack: u32, flags: u8, payload: &[u8]) -> Bytes {
    let header = TcpHeader {
        source_port: port,
        destination_port: SERVER_PORT,
        sequence_number: SequenceNumber::new(seq),
        acknowledgement_number: SequenceNumber::new(ack),
        flags,
        window: u16::MAX,
    };
    build_tcp_packet(CLIENT, SERVER, &header, payload)
}
