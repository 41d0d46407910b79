//! tunnel-tcp: user-space TCP for tunneled connections
//!
//! This crate terminates client TCP connections that arrive as raw IPv4/TCP
//! packets over a tunnel and relays each connection's byte stream to an
//! upstream relay, doing the work a kernel TCP stack would do.
//!
//! # Architecture
//!
//! ```text
//! Tunnel ──IPv4/TCP──► TcpProxy ──► TcpConnection (per 4-tuple)
//!    ▲                                  │   straws, retransmission
//!    └────────IPv4/TCP──────────────────┤
//!                                       ▼
//!                               UpstreamPump ◄──framed bytes──► Relay
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio::sync::{mpsc, oneshot};
//! use tunnel_tcp::config::load_config;
//! use tunnel_tcp::proxy::TcpProxy;
//! use tunnel_tcp::upstream::TcpUpstreamConnector;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("/etc/tunnel-tcp/engine.json")?;
//! let connector = Arc::new(TcpUpstreamConnector::from_config(&config)?);
//!
//! // Packets for the tunnel come out of `tunnel_rx`
//! let (tunnel_tx, mut tunnel_rx) = mpsc::channel(1024);
//! let proxy = TcpProxy::new(&config, connector, tunnel_tx);
//!
//! // Packets from the tunnel go into `inbound_tx`
//! let (inbound_tx, inbound_rx) = mpsc::channel(1024);
//! let (shutdown_tx, shutdown_rx) = oneshot::channel();
//! proxy.run(inbound_rx, shutdown_rx).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and loading
//! - [`error`]: Error types
//! - [`proxy`]: Connection table and demultiplexer
//! - [`stats`]: Engine counters
//! - [`straw`]: Flow-controlled byte buffers
//! - [`tcp`]: Sequence arithmetic, retransmission and the state machine
//! - [`upstream`]: Relay framing, connector and pump
//! - [`wire`]: IPv4/TCP parsing and construction

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod proxy;
pub mod stats;
pub mod straw;
pub mod tcp;
pub mod upstream;
pub mod wire;

// Re-export commonly used types at the crate root
pub use config::{EngineConfig, ServerConfig};
pub use error::{ConfigError, EngineError, Result};
pub use proxy::{ProxyError, TcpProxy};
pub use stats::{EngineStats, StatsSnapshot};
pub use tcp::{SequenceNumber, SequenceNumberRange, TcpConnection, TcpState};
pub use upstream::{TcpUpstreamConnector, UpstreamConnector, UpstreamError};
pub use wire::{Identity, PacketError};
