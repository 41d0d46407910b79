//! Time-gated replay of unacknowledged outbound segments
//!
//! The queue is owned by a single connection. Segments are appended in the
//! order they were sent, which is also sequence order, so the front of the
//! queue is always the oldest unacknowledged data.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::error::RetransmissionError;
use super::segment::Segment;
use super::sequence::SequenceNumber;
use crate::config::defaults::RETRANSMIT_INTERVAL_MS;

/// Ordered collection of sent-but-unacknowledged segments
#[derive(Debug)]
pub struct RetransmissionQueue {
    segments: VecDeque<Segment>,
    interval: Duration,
}

impl Default for RetransmissionQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(RETRANSMIT_INTERVAL_MS))
    }
}

impl RetransmissionQueue {
    /// Create a queue that allows a resend once a segment is `interval` old
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            segments: VecDeque::new(),
            interval,
        }
    }

    pub fn add(&mut self, segment: Segment) {
        self.segments.push_back(segment);
    }

    /// Drop every segment fully covered by `ack`
    ///
    /// Returns the number of segments removed.
    pub fn acknowledge(&mut self, ack: SequenceNumber) -> usize {
        let before = self.segments.len();
        self.segments.retain(|segment| !segment.is_covered_by(ack));
        before - self.segments.len()
    }

    /// Oldest segment, if it is due for retransmission at `now`
    ///
    /// # Errors
    ///
    /// - [`RetransmissionError::RetransmissionQueueEmpty`] when nothing is queued
    /// - [`RetransmissionError::TooSoonToRetransmit`] when the oldest segment
    ///   was sent less than one interval ago
    pub fn next(&self, now: Instant) -> Result<&Segment, RetransmissionError> {
        let segment = self
            .segments
            .front()
            .ok_or(RetransmissionError::RetransmissionQueueEmpty)?;

        if segment.age(now) >= self.interval {
            Ok(segment)
        } else {
            Err(RetransmissionError::TooSoonToRetransmit(
                segment.sequence_number(),
            ))
        }
    }

    /// Record that the segment starting at `sequence_number` was resent
    ///
    /// # Errors
    ///
    /// Returns [`RetransmissionError::SegmentNotFound`] if no such segment is queued.
    pub fn mark_resent(
        &mut self,
        sequence_number: SequenceNumber,
        now: Instant,
    ) -> Result<(), RetransmissionError> {
        let segment = self
            .segments
            .iter_mut()
            .find(|segment| segment.sequence_number() == sequence_number)
            .ok_or(RetransmissionError::SegmentNotFound(sequence_number))?;
        segment.refresh(now);
        Ok(())
    }

    /// Cancel every pending resend
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::tcp::sequence::SequenceNumberRange;

    fn data_segment(start: u32, payload: &'static [u8], at: Instant) -> Segment {
        let window = SequenceNumberRange::with_size(SequenceNumber::new(start), payload.len() as u32);
        Segment::new(Bytes::from_static(payload), window, at)
    }

    #[test]
    fn test_next_on_empty_queue() {
        let queue = RetransmissionQueue::default();
        assert_eq!(
            queue.next(Instant::now()).unwrap_err(),
            RetransmissionError::RetransmissionQueueEmpty
        );
    }

    #[test]
    fn test_next_respects_interval() {
        let t0 = Instant::now();
        let mut queue = RetransmissionQueue::default();
        queue.add(data_segment(1000, b"abc", t0));

        let err = queue.next(t0 + Duration::from_millis(50)).unwrap_err();
        assert_eq!(err, RetransmissionError::TooSoonToRetransmit(SequenceNumber::new(1000)));

        let segment = queue.next(t0 + Duration::from_millis(120)).unwrap();
        assert_eq!(segment.data().as_ref(), b"abc");
        // Inspection leaves the timestamp alone
        assert_eq!(queue.next(t0 + Duration::from_millis(120)).unwrap().timestamp(), t0);
    }

    #[test]
    fn test_acknowledge_removes_covered_segments() {
        let t0 = Instant::now();
        let mut queue = RetransmissionQueue::default();
        queue.add(data_segment(1000, b"abc", t0));
        queue.add(data_segment(1003, b"defg", t0));

        assert_eq!(queue.acknowledge(SequenceNumber::new(1005)), 1);
        let later = t0 + Duration::from_millis(120);
        assert_eq!(queue.next(later).unwrap().sequence_number(), SequenceNumber::new(1003));

        assert_eq!(queue.acknowledge(SequenceNumber::new(1007)), 1);
        assert_eq!(
            queue.next(later).unwrap_err(),
            RetransmissionError::RetransmissionQueueEmpty
        );
    }

    #[test]
    fn test_acknowledge_across_wrap() {
        let t0 = Instant::now();
        let mut queue = RetransmissionQueue::default();
        queue.add(data_segment(u32::MAX - 1, b"wrap", t0));

        assert_eq!(queue.acknowledge(SequenceNumber::new(1)), 0);
        assert_eq!(queue.acknowledge(SequenceNumber::new(2)), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_mark_resent_refreshes_timestamp() {
        let t0 = Instant::now();
        let mut queue = RetransmissionQueue::default();
        queue.add(data_segment(5, b"x", t0));

        let t1 = t0 + Duration::from_millis(150);
        queue.mark_resent(SequenceNumber::new(5), t1).unwrap();
        assert!(queue.next(t1 + Duration::from_millis(10)).is_err());
        assert!(queue.next(t1 + Duration::from_millis(100)).is_ok());
        assert!(queue.mark_resent(SequenceNumber::new(6), t1).is_err());
    }

    #[test]
    fn test_clear_cancels_data_and_fin() {
        let t0 = Instant::now();
        let mut queue = RetransmissionQueue::default();
        queue.add(data_segment(10, b"aa", t0));
        queue.add(Segment::fin(SequenceNumber::new(12), t0));

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(
            queue.next(t0 + Duration::from_secs(1)).unwrap_err(),
            RetransmissionError::RetransmissionQueueEmpty
        );
    }
}
