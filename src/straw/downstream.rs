//! Server-to-client flow control
//!
//! The upstream pump writes relay bytes into the shared [`Straw`]; the
//! connection peeks segments out of it and only discards bytes once the
//! client acknowledges them, so any unacknowledged window can be resent
//! verbatim.
//!
//! ```text
//!   SND.UNA            SND.NXT                 data end
//!      │   in flight      │      unsent            │
//!      ├──────────────────┼────────────────────────┤
//!      └── window().lower_bound      window().upper_bound
//! ```

use std::sync::Arc;

use bytes::Bytes;

use super::buffer::Straw;
use super::error::StrawError;
use crate::tcp::{SequenceNumber, SequenceNumberRange};

/// Sequence-addressed view over the server-to-client straw
#[derive(Debug)]
pub struct DownstreamStraw {
    straw: Arc<Straw>,
    una: SequenceNumber,
    next: SequenceNumber,
}

impl DownstreamStraw {
    /// Wrap `straw`, numbering its first byte `segment_start`
    #[must_use]
    pub fn new(straw: Arc<Straw>, segment_start: SequenceNumber) -> Self {
        Self {
            straw,
            una: segment_start,
            next: segment_start,
        }
    }

    /// Shared buffer the upstream pump writes into
    #[must_use]
    pub fn straw(&self) -> &Arc<Straw> {
        &self.straw
    }

    /// SND.NXT: sequence number of the next byte to send
    #[must_use]
    pub fn sequence_number(&self) -> SequenceNumber {
        self.next
    }

    /// SND.UNA: oldest sequence number not yet acknowledged
    #[must_use]
    pub fn unacknowledged(&self) -> SequenceNumber {
        self.una
    }

    /// Window of buffered bytes, from SND.UNA to the end of the data
    #[must_use]
    pub fn window(&self) -> SequenceNumberRange {
        SequenceNumberRange::with_size(self.una, self.buffered_len())
    }

    /// How many more bytes the straw accepts before it needs acknowledgments
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.straw.available()
    }

    /// Acceptance window implied by the peer's advertised `size`
    #[must_use]
    pub fn client_window(&self, size: u16) -> SequenceNumberRange {
        SequenceNumberRange::with_size(self.una, u32::from(size))
    }

    /// Bytes written by the pump and not yet acknowledged
    #[must_use]
    pub fn buffered_len(&self) -> u32 {
        u32::try_from(self.straw.len()).unwrap_or(u32::MAX)
    }

    /// Bytes written but not yet sent
    #[must_use]
    pub fn unsent_len(&self) -> u32 {
        let end = self.window().upper_bound();
        let sent = self.next.distance(self.una);
        end.distance(self.una).saturating_sub(sent)
    }

    /// True when every buffered byte has been sent at least once
    #[must_use]
    pub fn is_fully_sent(&self) -> bool {
        self.unsent_len() == 0
    }

    /// True when everything sent, including any FIN, has been acknowledged
    #[must_use]
    pub fn is_fully_acknowledged(&self) -> bool {
        self.una == self.next
    }

    /// Next unsent range no larger than `max_size` that fits the peer window
    ///
    /// Returns `None` when nothing can be sent right now.
    #[must_use]
    pub fn next_window(&self, max_size: usize, peer_window: u16) -> Option<SequenceNumberRange> {
        let in_flight = self.next.distance(self.una);
        let usable = self.client_window(peer_window).size().saturating_sub(in_flight);
        let max_size = u32::try_from(max_size).unwrap_or(u32::MAX);
        let size = self.unsent_len().min(usable).min(max_size);

        (size > 0).then(|| SequenceNumberRange::with_size(self.next, size))
    }

    /// Copy out exactly the bytes covering `window`
    ///
    /// Works for ranges already sent as long as they are not acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::SegmentMismatch`] if `window` is not inside the
    /// buffered range.
    pub fn read(&self, window: &SequenceNumberRange) -> Result<Bytes, StrawError> {
        let buffered = self.window();
        let offset = window.lower_bound().distance(self.una);
        let fits = u64::from(offset) + u64::from(window.size()) <= u64::from(buffered.size());
        if !fits {
            return Err(StrawError::SegmentMismatch {
                requested: *window,
                buffered,
            });
        }

        self.straw
            .peek(offset as usize, window.size() as usize)
            .map_err(|_| StrawError::SegmentMismatch {
                requested: *window,
                buffered,
            })
    }

    /// Record that `window` has been sent, advancing SND.NXT
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::SegmentMismatch`] if `window` does not start at SND.NXT.
    pub fn mark_sent(&mut self, window: &SequenceNumberRange) -> Result<(), StrawError> {
        if window.lower_bound() != self.next {
            return Err(StrawError::SegmentMismatch {
                requested: *window,
                buffered: self.window(),
            });
        }

        self.next = window.upper_bound();
        Ok(())
    }

    /// Consume one sequence number for a SYN or FIN
    pub fn increment_for_control(&mut self) {
        self.next = self.next.increment();
    }

    /// Apply the client's acknowledgment number
    ///
    /// Only a strictly increasing `ack` has any effect. Returns the number
    /// of payload bytes released.
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::BadSegmentWindow`] if `ack` acknowledges data
    /// that was never sent.
    pub fn acknowledge(&mut self, ack: SequenceNumber) -> Result<usize, StrawError> {
        if !(self.una < ack) {
            return Ok(0);
        }

        let acknowledged = ack.distance(self.una);
        let in_flight = self.next.distance(self.una);
        if acknowledged > in_flight {
            return Err(StrawError::BadSegmentWindow(format!(
                "ack {ack} beyond SND.NXT {}",
                self.next
            )));
        }

        let released = (acknowledged as usize).min(self.straw.len());
        self.straw.discard(released)?;
        self.una = ack;
        Ok(released)
    }
}
