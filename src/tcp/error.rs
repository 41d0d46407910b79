//! Error types for the TCP engine core
//!
//! Two families live here:
//!
//! - [`SequenceError`]: a window bound was asked to move further than allowed
//! - [`RetransmissionError`]: control signals from the retransmission queue.
//!   These are not failures; the timer loop uses them to decide whether to
//!   resend anything.

use thiserror::Error;

use super::sequence::SequenceNumber;

/// Errors from sequence range arithmetic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// A bound increase exceeded the allowed step
    #[error("sequence range increase out of bounds: {requested} exceeds limit {limit}")]
    OutOfBounds {
        /// Requested increase
        requested: u32,
        /// Largest increase allowed for this call
        limit: u32,
    },
}

/// Signals produced by the retransmission queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetransmissionError {
    /// Nothing is waiting for acknowledgment
    #[error("retransmission queue empty")]
    RetransmissionQueueEmpty,

    /// The oldest segment was sent too recently to resend
    #[error("too soon to retransmit segment {0}")]
    TooSoonToRetransmit(SequenceNumber),

    /// No queued segment starts at the given sequence number
    #[error("no queued segment starts at {0}")]
    SegmentNotFound(SequenceNumber),
}

impl RetransmissionError {
    /// Returns true for the signals the timer loop expects on every tick
    #[must_use]
    pub fn is_control_signal(&self) -> bool {
        matches!(
            self,
            Self::RetransmissionQueueEmpty | Self::TooSoonToRetransmit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SequenceError::OutOfBounds {
            requested: 70_000,
            limit: 65_535,
        };
        assert_eq!(
            err.to_string(),
            "sequence range increase out of bounds: 70000 exceeds limit 65535"
        );

        let err = RetransmissionError::TooSoonToRetransmit(SequenceNumber::new(9));
        assert_eq!(err.to_string(), "too soon to retransmit segment 9");
    }

    #[test]
    fn test_is_control_signal() {
        assert!(RetransmissionError::RetransmissionQueueEmpty.is_control_signal());
        assert!(RetransmissionError::TooSoonToRetransmit(SequenceNumber::ZERO).is_control_signal());
        assert!(!RetransmissionError::SegmentNotFound(SequenceNumber::ZERO).is_control_signal());
    }
}
