//! Error types for straws
//!
//! Buffer contract violations (`MisorderedSegment`, `SegmentMismatch`,
//! `BadSegmentWindow`) are always recoverable: the caller drops the offending
//! packet and the connection carries on. `Closed` means the owning connection
//! is tearing down.

use thiserror::Error;

use crate::tcp::{SequenceError, SequenceNumber, SequenceNumberRange};

/// Errors raised by straw operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrawError {
    /// A bounded straw cannot take the whole write
    #[error("buffer full: {requested} bytes requested, {available} available")]
    BufferFull {
        /// Bytes offered
        requested: usize,
        /// Free space at the time of the write
        available: usize,
    },

    /// A read asked for more bytes than a bounded straw can ever hold
    #[error("read of {requested} bytes exceeds straw capacity {capacity}")]
    ExceedsCapacity {
        /// Bytes requested
        requested: usize,
        /// Straw capacity
        capacity: usize,
    },

    /// Fewer bytes are buffered than a peek or discard needs
    #[error("not enough data: {requested} bytes requested, {available} buffered")]
    NotEnoughData {
        /// Bytes requested
        requested: usize,
        /// Bytes buffered
        available: usize,
    },

    /// The straw was closed
    #[error("straw closed")]
    Closed,

    /// A segment did not start at the next expected sequence number
    #[error("misordered segment: expected {expected}, got {actual}")]
    MisorderedSegment {
        /// Next expected sequence number
        expected: SequenceNumber,
        /// Sequence number carried by the segment
        actual: SequenceNumber,
    },

    /// A requested window does not line up with the buffered bytes
    #[error("segment mismatch: {requested} is outside buffered window {buffered}")]
    SegmentMismatch {
        /// Window that was asked for
        requested: SequenceNumberRange,
        /// Window currently held
        buffered: SequenceNumberRange,
    },

    /// An acknowledgment or payload does not fit the current window
    #[error("bad segment window: {0}")]
    BadSegmentWindow(String),

    /// Window arithmetic failed
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),
}

impl StrawError {
    /// Returns true if dropping the offending packet is enough to recover
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Returns true for violations of the segment ordering and window contract
    #[must_use]
    pub fn is_buffer_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::MisorderedSegment { .. } | Self::SegmentMismatch { .. } | Self::BadSegmentWindow(_)
        )
    }
}
