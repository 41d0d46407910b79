//! Client-to-server flow control
//!
//! Segments from the client are accepted strictly in order: a segment must
//! start exactly at RCV.NXT. There is no reordering buffer, gaps are left for
//! the client to fill by retransmitting. Accepted payload goes into the
//! shared [`Straw`], which the upstream pump drains towards the relay. The
//! receive window advertised to the client is the straw's free space.

use std::sync::Arc;

use super::buffer::Straw;
use super::error::StrawError;
use crate::tcp::{SequenceNumber, SequenceNumberRange};

/// Sequence-checked writer over the client-to-server straw
#[derive(Debug)]
pub struct UpstreamStraw {
    straw: Arc<Straw>,
    next: SequenceNumber,
    capacity: u16,
}

impl UpstreamStraw {
    /// Wrap `straw`, expecting the client's next byte at `segment_start`
    #[must_use]
    pub fn new(straw: Arc<Straw>, segment_start: SequenceNumber) -> Self {
        let capacity = straw
            .capacity()
            .map_or(u16::MAX, |capacity| u16::try_from(capacity).unwrap_or(u16::MAX));
        Self {
            straw,
            next: segment_start,
            capacity,
        }
    }

    /// Shared buffer the upstream pump reads from
    #[must_use]
    pub fn straw(&self) -> &Arc<Straw> {
        &self.straw
    }

    /// RCV.NXT: the acknowledgment number to send
    #[must_use]
    pub fn acknowledgement_number(&self) -> SequenceNumber {
        self.next
    }

    /// Bytes accepted but not yet delivered upstream, ending at RCV.NXT
    #[must_use]
    pub fn window(&self) -> SequenceNumberRange {
        let buffered = u32::try_from(self.straw.len()).unwrap_or(u32::MAX);
        SequenceNumberRange::new(self.next.rewind(buffered), self.next)
    }

    /// RCV.WND: remaining receive window advertised to the client
    #[must_use]
    pub fn window_size(&self) -> u16 {
        let buffered = self.straw.len();
        u16::try_from(usize::from(self.capacity).saturating_sub(buffered)).unwrap_or(0)
    }

    /// Sequence numbers the client may currently send
    #[must_use]
    pub fn receive_window(&self) -> SequenceNumberRange {
        SequenceNumberRange::with_size(self.next, u32::from(self.window_size()))
    }

    /// True when a segment starting at `sequence_number` with `payload_len`
    /// bytes can be written now
    #[must_use]
    pub fn in_window(&self, sequence_number: SequenceNumber, payload_len: usize) -> bool {
        if sequence_number != self.next {
            return false;
        }

        payload_len == 0 || payload_len <= usize::from(self.window_size())
    }

    /// Accept `payload` starting at `sequence_number`
    ///
    /// Nothing changes when the write is rejected.
    ///
    /// # Errors
    ///
    /// - [`StrawError::MisorderedSegment`] if the segment does not start at RCV.NXT
    /// - [`StrawError::BadSegmentWindow`] if the payload exceeds the receive window
    /// - [`StrawError::Closed`] if the upstream side has been closed
    pub fn write(&mut self, sequence_number: SequenceNumber, payload: &[u8]) -> Result<(), StrawError> {
        if sequence_number != self.next {
            return Err(StrawError::MisorderedSegment {
                expected: self.next,
                actual: sequence_number,
            });
        }

        if payload.is_empty() {
            return Ok(());
        }

        let window = self.window_size();
        if payload.len() > usize::from(window) {
            return Err(StrawError::BadSegmentWindow(format!(
                "{} byte payload exceeds receive window {window}",
                payload.len()
            )));
        }

        self.straw.write(payload)?;
        // Payload fits the window, so the length is at most u16::MAX
        self.next = self.next.add(payload.len() as u32);
        Ok(())
    }

    /// Consume one sequence number for a SYN or FIN from the client
    pub fn increment(&mut self) {
        self.next = self.next.increment();
    }

    /// Stop accepting payload; the pump drains what is left, then closes
    pub fn close(&self) {
        self.straw.close();
    }
}
