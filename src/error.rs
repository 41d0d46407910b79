//! Error types for tunnel-tcp
//!
//! Each subsystem defines its own error enum next to its code. This module
//! aggregates them into [`EngineError`] and holds the configuration errors.

use std::io;

use thiserror::Error;

use crate::proxy::ProxyError;
use crate::straw::StrawError;
use crate::tcp::{RetransmissionError, SequenceError};
use crate::upstream::UpstreamError;
use crate::wire::PacketError;

/// Top-level error type for tunnel-tcp
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Straw buffer contract violations
    #[error("Straw error: {0}")]
    Straw(#[from] StrawError),

    /// Malformed tunnel input
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// Relay stream errors
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Sequence window errors
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Retransmission queue signals
    #[error("Retransmission error: {0}")]
    Retransmission(#[from] RetransmissionError),

    /// Demultiplexer errors
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Check if this error is recoverable (the engine keeps running)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Straw(e) => e.is_recoverable(),
            Self::Packet(_) | Self::Sequence(_) | Self::Retransmission(_) => true,
            Self::Upstream(e) => e.is_recoverable(),
            Self::Proxy(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Result type alias using `EngineError`
pub type Result<T> = std::result::Result<T, EngineError>;
