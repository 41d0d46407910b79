//! Upstream admission
//!
//! A new client connection is only admitted once a connector has produced
//! an upstream stream for its identity.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::UpstreamError;
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::wire::Identity;

/// Byte stream to the relay for one connection
pub trait UpstreamStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> UpstreamStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Opens upstream streams for new connections
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open the upstream stream for `identity`
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be reached. The client is then
    /// answered with a reset.
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn UpstreamStream>, UpstreamError>;
}

/// Connects to a TCP relay and announces the identity as the first 12 bytes
#[derive(Debug, Clone)]
pub struct TcpUpstreamConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl TcpUpstreamConnector {
    #[must_use]
    pub fn new(addr: SocketAddr, connect_timeout: Duration) -> Self {
        Self { addr, connect_timeout }
    }

    /// Create a connector for the configured relay
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the relay address is invalid.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.relay.socket_addr()?, config.connect_timeout()))
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl UpstreamConnector for TcpUpstreamConnector {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn UpstreamStream>, UpstreamError> {
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(UpstreamError::connect_failed(self.addr, e.to_string())),
            Err(_) => {
                return Err(UpstreamError::Timeout {
                    timeout_secs: self.connect_timeout.as_secs(),
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        stream.write_all(&identity.to_bytes()).await?;
        debug!("{}: relay connected via {}", identity, self.addr);
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::wire::IDENTITY_LEN;

    fn identity() -> Identity {
        Identity::new(Ipv4Addr::new(10, 0, 0, 2), 40_000, Ipv4Addr::new(1, 1, 1, 1), 443)
    }

    #[tokio::test]
    async fn test_connect_announces_identity() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let connector = TcpUpstreamConnector::new(listener.local_addr().unwrap(), Duration::from_secs(5));

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = [0u8; IDENTITY_LEN];
            socket.read_exact(&mut header).await.unwrap();
            Identity::from_bytes(&header).unwrap()
        });

        let _stream = connector.connect(&identity()).await.unwrap();
        assert_eq!(accept.await.unwrap(), identity());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = TcpUpstreamConnector::new(addr, Duration::from_secs(5));
        let err = connector.connect(&identity()).await.err().unwrap();
        assert!(matches!(err, UpstreamError::ConnectFailed { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_config() {
        let connector = TcpUpstreamConnector::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(connector.addr(), "127.0.0.1:1234".parse().unwrap());
    }
}
