//! Outbound segments awaiting acknowledgment

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::sequence::{SequenceNumber, SequenceNumberRange};

/// Payload bytes sent to the client, the sequence range they occupy and
/// when they were last sent
///
/// A FIN segment carries no payload but occupies one sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    data: Bytes,
    window: SequenceNumberRange,
    timestamp: Instant,
    fin: bool,
}

impl Segment {
    /// Data segment occupying `window`
    #[must_use]
    pub fn new(data: Bytes, window: SequenceNumberRange, timestamp: Instant) -> Self {
        Self {
            data,
            window,
            timestamp,
            fin: false,
        }
    }

    /// FIN segment sent at `sequence_number`
    #[must_use]
    pub fn fin(sequence_number: SequenceNumber, timestamp: Instant) -> Self {
        Self {
            data: Bytes::new(),
            window: SequenceNumberRange::with_size(sequence_number, 1),
            timestamp,
            fin: true,
        }
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn window(&self) -> SequenceNumberRange {
        self.window
    }

    /// Sequence number of the first byte (or of the FIN)
    #[must_use]
    pub fn sequence_number(&self) -> SequenceNumber {
        self.window.lower_bound()
    }

    /// Acknowledgment number that fully covers this segment
    #[must_use]
    pub fn end(&self) -> SequenceNumber {
        self.window.upper_bound()
    }

    #[must_use]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    #[must_use]
    pub fn is_fin(&self) -> bool {
        self.fin
    }

    /// Time since the segment was last sent
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }

    /// True when `ack` acknowledges every sequence number of this segment
    #[must_use]
    pub fn is_covered_by(&self, ack: SequenceNumber) -> bool {
        let end = self.end();
        end == ack || end < ack
    }

    pub(crate) fn refresh(&mut self, now: Instant) {
        self.timestamp = now;
    }
}
