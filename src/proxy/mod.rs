//! Connection demultiplexer
//!
//! # Architecture
//!
//! ```text
//!   tunnel ──raw IPv4──► TcpProxy::process_inbound_packet
//!                              │ identity lookup (ConnectionTable)
//!                              ▼
//!                  ConnectionTask (one per identity)
//!                  ├── TcpConnection   state machine, straws, retransmission
//!                  ├── interval        retransmit / idle timer
//!                  └── UpstreamPump    relay stream, spawned after connect
//!                              │
//!   tunnel ◄──raw IPv4─────────┘ (mpsc::Sender<Bytes>)
//! ```
//!
//! Packets for unknown identities never create state unless they are a SYN.
//! A connection task removes its own table entry when it ends.

mod demux;
mod error;
mod table;
mod task;

pub use demux::TcpProxy;
pub use error::ProxyError;
pub use table::{ConnectionHandle, ConnectionTable};
