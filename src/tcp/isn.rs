//! Initial sequence number selection
//!
//! RFC 793 §3.3: the ISN generator is a 32-bit clock whose low-order bit
//! ticks roughly every 4 microseconds, so it cycles about every 4.55 hours.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::sequence::SequenceNumber;
use crate::config::defaults::ISN_TICK_MICROS;

/// ISN derived from the current wall clock
#[must_use]
pub fn initial_sequence_number() -> SequenceNumber {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    isn_at(since_epoch)
}

/// ISN for a clock reading `since_epoch`
#[must_use]
pub fn isn_at(since_epoch: Duration) -> SequenceNumber {
    let ticks = since_epoch.as_micros() / u128::from(ISN_TICK_MICROS);
    // Keep the low 32 bits: the clock wraps at 2^32
    SequenceNumber::new((ticks & u128::from(u32::MAX)) as u32)
}
