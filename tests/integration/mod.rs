//! Integration tests for tunnel-tcp
//!
//! Every test drives a real [`TcpProxy`](tunnel_tcp::TcpProxy) with raw
//! IPv4/TCP packets and a mock relay over in-memory streams.
//!
//! # Test Organization
//!
//! - `harness`: mock connector, mock relay and packet helpers
//! - `connection_lifecycle`: handshake, data in both directions, close
//! - `closed_state`: packets for unknown connections, admission failures

pub mod closed_state;
pub mod connection_lifecycle;
pub mod harness;
