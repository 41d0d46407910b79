//! Errors raised by the demultiplexer

use thiserror::Error;

use crate::wire::PacketError;

/// Errors for one inbound packet
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The packet could not be parsed and was dropped
    #[error("dropped packet: {0}")]
    Packet(#[from] PacketError),

    /// A SYN was refused because the table is full
    #[error("connection table full ({0} connections)")]
    TableFull(usize),

    /// The tunnel sink is gone
    #[error("tunnel closed")]
    TunnelClosed,
}

impl ProxyError {
    /// Check if the proxy can keep processing packets
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Packet(_) | Self::TableFull(_) => true,
            Self::TunnelClosed => false,
        }
    }
}
