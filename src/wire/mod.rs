//! Tunnel wire formats
//!
//! Raw IPv4/TCP packets in both directions, and the 4-tuple identity that
//! keys connections.

mod error;
mod identity;
mod packet;

pub use error::PacketError;
pub use identity::{Identity, IDENTITY_LEN};
pub use packet::{build_tcp_packet, flags_string, parse_packet, tcp_flags, TcpHeader, TcpSegment};
