//! Connection identity (4-tuple)

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use super::error::PacketError;

/// Serialized size of an [`Identity`]
pub const IDENTITY_LEN: usize = 12;

/// The 4-tuple identifying one client connection
///
/// `local` is the client side (source of inbound packets), `remote` is the
/// destination the client is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Client address
    pub local_address: Ipv4Addr,
    /// Client port
    pub local_port: u16,
    /// Destination address
    pub remote_address: Ipv4Addr,
    /// Destination port
    pub remote_port: u16,
}

impl Identity {
    #[must_use]
    pub const fn new(
        local_address: Ipv4Addr,
        local_port: u16,
        remote_address: Ipv4Addr,
        remote_port: u16,
    ) -> Self {
        Self {
            local_address,
            local_port,
            remote_address,
            remote_port,
        }
    }

    /// Client endpoint
    #[must_use]
    pub fn local(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.local_address, self.local_port)
    }

    /// Destination endpoint
    #[must_use]
    pub fn remote(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.remote_address, self.remote_port)
    }

    /// Encode as local address, local port, remote address, remote port
    /// (network byte order)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; IDENTITY_LEN] {
        let mut bytes = [0u8; IDENTITY_LEN];
        bytes[0..4].copy_from_slice(&self.local_address.octets());
        bytes[4..6].copy_from_slice(&self.local_port.to_be_bytes());
        bytes[6..10].copy_from_slice(&self.remote_address.octets());
        bytes[10..12].copy_from_slice(&self.remote_port.to_be_bytes());
        bytes
    }

    /// Decode the 12-byte form produced by [`Identity::to_bytes`]
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::BadIdentity`] if `bytes` is not exactly 12 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let bytes: &[u8; IDENTITY_LEN] = bytes
            .try_into()
            .map_err(|_| PacketError::BadIdentity(bytes.len()))?;

        Ok(Self {
            local_address: Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            local_port: u16::from_be_bytes([bytes[4], bytes[5]]),
            remote_address: Ipv4Addr::new(bytes[6], bytes[7], bytes[8], bytes[9]),
            remote_port: u16::from_be_bytes([bytes[10], bytes[11]]),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.local_address, self.local_port, self.remote_address, self.remote_port
        )
    }
}
