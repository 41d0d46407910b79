//! Errors for malformed tunnel input
//!
//! Every variant means "drop this one packet". None of them tears down a
//! connection.

use thiserror::Error;

/// Errors raised while decoding packets or identities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The bytes are not a usable IPv4 packet
    #[error("bad IPv4 packet: {0}")]
    BadIpv4Packet(String),

    /// The IPv4 packet carries something other than TCP
    #[error("not a TCP packet: protocol {0}")]
    NotTcp(u8),

    /// The TCP header is truncated or inconsistent
    #[error("bad TCP segment: {0}")]
    BadTcpSegment(String),

    /// IPv4 or TCP checksum did not verify
    #[error("bad {0} checksum")]
    BadChecksum(&'static str),

    /// A serialized identity has the wrong length
    #[error("bad identity: expected 12 bytes, got {0}")]
    BadIdentity(usize),
}

impl PacketError {
    /// Returns true when the input was not IPv4/TCP at all, as opposed to a
    /// corrupt IPv4/TCP packet
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::NotTcp(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(PacketError::NotTcp(17).to_string(), "not a TCP packet: protocol 17");
        assert_eq!(PacketError::BadChecksum("TCP").to_string(), "bad TCP checksum");
        assert_eq!(
            PacketError::BadIdentity(3).to_string(),
            "bad identity: expected 12 bytes, got 3"
        );
    }

    #[test]
    fn test_is_unsupported() {
        assert!(PacketError::NotTcp(1).is_unsupported());
        assert!(!PacketError::BadIpv4Packet("short".into()).is_unsupported());
    }
}
