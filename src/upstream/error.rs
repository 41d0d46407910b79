//! Errors for the upstream byte stream
//!
//! Any of these ends the connection it belongs to. `is_recoverable` only
//! says whether a new connection to the same relay may succeed.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::defaults::UPSTREAM_CONNECT_TIMEOUT_SECS;

/// Errors talking to the relay
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connecting to the relay failed
    #[error("failed to connect to relay {addr}: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },

    /// Connecting to the relay did not finish in time
    #[error("connect timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The relay violated the framing protocol
    #[error("upstream protocol error: {0}")]
    Protocol(String),

    /// The relay announced a frame larger than allowed
    #[error("upstream frame of {len} bytes exceeds limit {limit}")]
    FrameTooLarge { len: usize, limit: usize },

    /// The stream was already closed
    #[error("upstream closed")]
    Closed,

    /// I/O error on the relay stream
    #[error("upstream I/O error: {0}")]
    Io(#[from] io::Error),
}

impl UpstreamError {
    /// Create a connect failure error
    pub fn connect_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Timeout error for the default connect timeout
    #[must_use]
    pub const fn default_timeout() -> Self {
        Self::Timeout {
            timeout_secs: UPSTREAM_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Check if a new attempt may succeed
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectFailed { .. } | Self::Timeout { .. } => true,
            Self::Protocol(_) | Self::FrameTooLarge { .. } | Self::Closed => false,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }

    /// True when the relay simply went away rather than misbehaving
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
