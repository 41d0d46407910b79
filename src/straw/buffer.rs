//! Ordered blocking byte buffer
//!
//! A [`Straw`] is shared between exactly one producer and one consumer,
//! usually on different tasks. Reads suspend until bytes arrive, bounded
//! writes through [`Straw::write_all`] suspend until space frees up. Closing
//! the straw wakes both sides.
//!
//! The lock is never held across an await point.

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::error::StrawError;

#[derive(Debug, Default)]
struct StrawInner {
    buffer: BytesMut,
    closed: bool,
}

/// Ordered byte buffer with suspending reads
#[derive(Debug, Default)]
pub struct Straw {
    inner: Mutex<StrawInner>,
    readable: Notify,
    writable: Notify,
    capacity: Option<usize>,
}

impl Straw {
    /// Create an unbounded straw
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a straw that holds at most `capacity` bytes
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Bytes currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free space, or `usize::MAX` for an unbounded straw
    #[must_use]
    pub fn available(&self) -> usize {
        let len = self.len();
        self.capacity.map_or(usize::MAX, |capacity| capacity.saturating_sub(len))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append `data` without waiting
    ///
    /// # Errors
    ///
    /// - [`StrawError::Closed`] if the straw was closed
    /// - [`StrawError::BufferFull`] if a bounded straw cannot take all of `data`
    pub fn write(&self, data: &[u8]) -> Result<(), StrawError> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(StrawError::Closed);
            }

            if let Some(capacity) = self.capacity {
                let available = capacity.saturating_sub(inner.buffer.len());
                if data.len() > available {
                    return Err(StrawError::BufferFull {
                        requested: data.len(),
                        available,
                    });
                }
            }

            inner.buffer.extend_from_slice(data);
        }

        if !data.is_empty() {
            self.readable.notify_one();
        }
        Ok(())
    }

    /// Append all of `data`, suspending while a bounded straw is full
    ///
    /// Data larger than the capacity is written in pieces as the reader
    /// makes room.
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::Closed`] if the straw is closed before every byte
    /// was written.
    pub async fn write_all(&self, mut data: &[u8]) -> Result<(), StrawError> {
        while !data.is_empty() {
            let written = {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(StrawError::Closed);
                }

                let room = self
                    .capacity
                    .map_or(data.len(), |capacity| capacity.saturating_sub(inner.buffer.len()));
                let count = room.min(data.len());
                inner.buffer.extend_from_slice(&data[..count]);
                count
            };

            if written > 0 {
                self.readable.notify_one();
                data = &data[written..];
            } else {
                self.writable.notified().await;
            }
        }

        Ok(())
    }

    /// Remove and return every buffered byte, suspending while empty
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::Closed`] once the straw is closed and drained.
    pub async fn read(&self) -> Result<Bytes, StrawError> {
        self.read_max(usize::MAX).await
    }

    /// Remove and return up to `max_size` bytes, suspending only while empty
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::Closed`] once the straw is closed and drained.
    pub async fn read_max(&self, max_size: usize) -> Result<Bytes, StrawError> {
        if max_size == 0 {
            return Ok(Bytes::new());
        }

        loop {
            if let Some(bytes) = self.take_if(|len| (len > 0).then(|| len.min(max_size)))? {
                return Ok(bytes);
            }
            self.readable.notified().await;
        }
    }

    /// Remove and return exactly `size` bytes, suspending until that many
    /// are buffered
    ///
    /// # Errors
    ///
    /// - [`StrawError::ExceedsCapacity`] if a bounded straw can never hold `size` bytes
    /// - [`StrawError::Closed`] if the straw closes before `size` bytes arrive
    pub async fn read_exact(&self, size: usize) -> Result<Bytes, StrawError> {
        if let Some(capacity) = self.capacity {
            if size > capacity {
                return Err(StrawError::ExceedsCapacity {
                    requested: size,
                    capacity,
                });
            }
        }

        if size == 0 {
            return Ok(Bytes::new());
        }

        loop {
            if let Some(bytes) = self.take_if(|len| (len >= size).then_some(size))? {
                return Ok(bytes);
            }
            self.readable.notified().await;
        }
    }

    /// Split off a prefix chosen by `amount`, or report closure when nothing
    /// can be taken
    fn take_if(&self, amount: impl FnOnce(usize) -> Option<usize>) -> Result<Option<Bytes>, StrawError> {
        let taken = {
            let mut inner = self.inner.lock();
            match amount(inner.buffer.len()) {
                Some(count) => Some(inner.buffer.split_to(count).freeze()),
                None if inner.closed => return Err(StrawError::Closed),
                None => None,
            }
        };

        if taken.is_some() {
            self.writable.notify_one();
        }
        Ok(taken)
    }

    /// Copy `size` bytes starting `offset` bytes into the buffer, without
    /// consuming them
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::NotEnoughData`] if the range is not fully buffered.
    pub fn peek(&self, offset: usize, size: usize) -> Result<Bytes, StrawError> {
        let inner = self.inner.lock();
        let end = offset.saturating_add(size);
        if end > inner.buffer.len() {
            return Err(StrawError::NotEnoughData {
                requested: end,
                available: inner.buffer.len(),
            });
        }

        Ok(Bytes::copy_from_slice(&inner.buffer[offset..end]))
    }

    /// Drop the first `count` buffered bytes
    ///
    /// # Errors
    ///
    /// Returns [`StrawError::NotEnoughData`] if fewer than `count` bytes are buffered.
    pub fn discard(&self, count: usize) -> Result<(), StrawError> {
        {
            let mut inner = self.inner.lock();
            if count > inner.buffer.len() {
                return Err(StrawError::NotEnoughData {
                    requested: count,
                    available: inner.buffer.len(),
                });
            }
            inner.buffer.advance(count);
        }

        if count > 0 {
            self.writable.notify_one();
        }
        Ok(())
    }

    /// Close the straw and wake both sides
    ///
    /// Buffered bytes stay readable. Further writes fail.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.readable.notify_one();
        self.writable.notify_one();
    }
}
