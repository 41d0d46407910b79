//! Compile-time defaults for the TCP engine
//!
//! These constants back [`EngineConfig`](super::EngineConfig) defaults and the
//! parts of the engine that do not read runtime configuration.
//!
//! # Network Parameters
//!
//! Outbound segments are capped at 1400 payload bytes so a full packet
//! (1400 + IPv4 header 20 + TCP header 20) stays under common tunnel MTUs.
//! The advertised receive window is fixed at 65,535 bytes; window scaling is
//! never negotiated.
//!
//! # Timeout Values
//!
//! - Retransmit interval: 100 ms, also the connection timer period
//! - TCP idle timeout: 300 seconds (5 minutes)

use std::time::Duration;

// =============================================================================
// Network Parameters
// =============================================================================

/// Largest payload carried by one outbound segment
pub const TCP_MTU: usize = 1400;

/// MSS option value advertised on the SYN-ACK
pub const TCP_MSS: u16 = 1400;

/// Receive window advertised to clients
///
/// Also the capacity of each flow-control straw.
pub const TCP_WINDOW_SIZE: u16 = u16::MAX;

/// TTL written into outbound IPv4 headers
pub const IPV4_TTL: u8 = 64;

// =============================================================================
// Timers
// =============================================================================

/// Minimum age before an unacknowledged segment is resent
pub const RETRANSMIT_INTERVAL_MS: u64 = 100;

/// Idle time after which a connection is reset
pub const TCP_IDLE_TIMEOUT_SECS: u64 = 300;

/// Time allowed for an upstream connect attempt
pub const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Delay between upstream read polls when the relay had no data
pub const UPSTREAM_POLL_INTERVAL_MS: u64 = 10;

/// How long a half-closed relay may stay silent before the close request
pub const UPSTREAM_DRAIN_TIMEOUT_MS: u64 = 500;

/// Resolution of the initial sequence number clock in microseconds
pub const ISN_TICK_MICROS: u64 = 4;

// =============================================================================
// Limits
// =============================================================================

/// Maximum concurrently tracked connections
pub const MAX_CONNECTIONS: usize = 4096;

/// Per-connection event queue depth
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Largest frame accepted from the upstream relay
pub const MAX_UPSTREAM_FRAME_LEN: usize = 1024 * 1024;

// =============================================================================
// Helper Functions
// =============================================================================

/// Retransmit interval as a Duration
#[inline]
#[must_use]
pub const fn retransmit_interval() -> Duration {
    Duration::from_millis(RETRANSMIT_INTERVAL_MS)
}

/// TCP idle timeout as a Duration
#[inline]
#[must_use]
pub const fn tcp_idle_timeout() -> Duration {
    Duration::from_secs(TCP_IDLE_TIMEOUT_SECS)
}
