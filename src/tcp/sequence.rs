//! Modular sequence number arithmetic
//!
//! TCP sequence numbers live in a 32-bit circular space. Every operation here
//! wraps instead of overflowing, and ordering is defined by comparing the
//! forward distance in each direction:
//!
//! ```text
//!   a < b  iff  distance(b, a) < distance(a, b)
//! ```
//!
//! Two values exactly 2^31 apart are neither less nor greater than each other.
//! `partial_cmp` returns `None` for that pair, so `<`, `<=`, `>` and `>=` are
//! all false. Callers that compare sequence numbers must not assume a total
//! order.

use std::cmp::Ordering;
use std::fmt;

use super::error::SequenceError;

/// Largest amount a range bound may move in a single call.
///
/// Matches the 16-bit TCP window field.
pub const MAX_BOUND_INCREASE: u32 = u16::MAX as u32;

/// A 32-bit TCP sequence number with wrapping arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceNumber(u32);

impl SequenceNumber {
    /// Sentinel holding `u32::MAX`
    pub const MAX: SequenceNumber = SequenceNumber(u32::MAX);

    /// Zero sequence number
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw 32-bit value as carried in the TCP header
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Advance by `n`, wrapping at the end of the sequence space
    #[inline]
    #[must_use]
    pub const fn add(self, n: u32) -> Self {
        Self(self.0.wrapping_add(n))
    }

    /// Advance by one, wrapping `MAX` to zero
    #[inline]
    #[must_use]
    pub const fn increment(self) -> Self {
        self.add(1)
    }

    /// Move back by `n`, wrapping below zero
    #[inline]
    #[must_use]
    pub const fn rewind(self, n: u32) -> Self {
        Self(self.0.wrapping_sub(n))
    }

    /// Forward modular distance from `other` to `self`
    #[inline]
    #[must_use]
    pub const fn distance(self, other: SequenceNumber) -> u32 {
        self.0.wrapping_sub(other.0)
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.0 == other.0 {
            return Some(Ordering::Equal);
        }

        let forward = other.distance(*self);
        let backward = self.distance(*other);

        match forward.cmp(&backward) {
            Ordering::Less => Some(Ordering::Less),
            Ordering::Greater => Some(Ordering::Greater),
            // Antipodal values: the heuristic cannot decide
            Ordering::Equal => None,
        }
    }
}

impl From<u32> for SequenceNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<SequenceNumber> for u32 {
    fn from(value: SequenceNumber) -> Self {
        value.0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A window of sequence numbers `[lower_bound, upper_bound]`
///
/// The range may straddle the wrap point, in which case `lower_bound` is
/// numerically greater than `upper_bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceNumberRange {
    lower_bound: SequenceNumber,
    upper_bound: SequenceNumber,
}

impl SequenceNumberRange {
    #[must_use]
    pub const fn new(lower_bound: SequenceNumber, upper_bound: SequenceNumber) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Range starting at `lower_bound` spanning `size` sequence numbers
    #[must_use]
    pub const fn with_size(lower_bound: SequenceNumber, size: u32) -> Self {
        Self {
            lower_bound,
            upper_bound: lower_bound.add(size),
        }
    }

    /// Zero-sized range positioned at `at`
    #[must_use]
    pub const fn empty(at: SequenceNumber) -> Self {
        Self::with_size(at, 0)
    }

    #[inline]
    #[must_use]
    pub const fn lower_bound(&self) -> SequenceNumber {
        self.lower_bound
    }

    #[inline]
    #[must_use]
    pub const fn upper_bound(&self) -> SequenceNumber {
        self.upper_bound
    }

    /// Modular distance from lower to upper bound
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.upper_bound.distance(self.lower_bound)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// True when the range crosses the end of the sequence space
    #[inline]
    #[must_use]
    pub const fn wraps(&self) -> bool {
        self.lower_bound.value() > self.upper_bound.value()
    }

    /// Check whether `sequence_number` lies within the range (inclusive)
    ///
    /// For a wrapped range, membership means "not strictly between the upper
    /// and lower bound".
    #[must_use]
    pub fn contains(&self, sequence_number: SequenceNumber) -> bool {
        let value = sequence_number.value();
        let lower = self.lower_bound.value();
        let upper = self.upper_bound.value();

        if self.wraps() {
            !(upper < value && value < lower)
        } else {
            lower <= value && value <= upper
        }
    }

    /// Move the lower bound forward by `by`
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::OutOfBounds`] if `by` exceeds the per-call
    /// limit or would move the lower bound past the upper bound.
    pub fn increase_lower_bound(&mut self, by: u32) -> Result<(), SequenceError> {
        let limit = MAX_BOUND_INCREASE.min(self.size());
        if by > limit {
            return Err(SequenceError::OutOfBounds {
                requested: by,
                limit,
            });
        }

        self.lower_bound = self.lower_bound.add(by);
        Ok(())
    }

    /// Move the upper bound forward by `by`
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::OutOfBounds`] if `by` exceeds 65,535.
    pub fn increase_upper_bound(&mut self, by: u32) -> Result<(), SequenceError> {
        if by > MAX_BOUND_INCREASE {
            return Err(SequenceError::OutOfBounds {
                requested: by,
                limit: MAX_BOUND_INCREASE,
            });
        }

        self.upper_bound = self.upper_bound.add(by);
        Ok(())
    }
}

impl fmt::Display for SequenceNumberRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower_bound, self.upper_bound)
    }
}
