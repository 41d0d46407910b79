//! Engine-wide counters
//!
//! Counters are plain atomics updated with relaxed ordering from the
//! demultiplexer and every connection task. [`EngineStats::snapshot`] gives
//! a serializable point-in-time copy.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::tcp::TcpState;

/// Counters shared by the demultiplexer and its connections
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Raw packets offered to the demultiplexer
    pub messages: AtomicU64,
    /// Packets that parsed as IPv4
    pub ipv4: AtomicU64,
    /// Packets that parsed as IPv4/TCP
    pub tcp: AtomicU64,
    /// IPv4 packets carrying another protocol
    pub non_tcp: AtomicU64,
    /// Packets dropped as malformed
    pub malformed: AtomicU64,
    /// Resets synthesized for unknown or failed connections
    pub resets_sent: AtomicU64,
    /// Connections admitted to the table
    pub connections_opened: AtomicU64,
    /// Connections removed from the table
    pub connections_closed: AtomicU64,
    /// SYNs refused because the table was full
    pub connections_rejected: AtomicU64,
    /// Segments resent by the retransmission timer
    pub retransmissions: AtomicU64,
    /// Payload bytes accepted from clients
    pub bytes_from_clients: AtomicU64,
    /// Payload bytes sent to clients (first transmission only)
    pub bytes_to_clients: AtomicU64,
    per_state: [AtomicU64; TcpState::ALL.len()],
}

impl EngineStats {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one inbound packet handled in `state`
    pub fn record_packet(&self, state: TcpState) {
        self.per_state[state.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound packets handled in `state` so far
    #[must_use]
    pub fn packets_in_state(&self, state: TcpState) -> u64 {
        self.per_state[state.index()].load(Ordering::Relaxed)
    }

    pub(crate) fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, amount: usize) {
        counter.fetch_add(amount as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of the statistics
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        StatsSnapshot {
            messages: load(&self.messages),
            ipv4: load(&self.ipv4),
            tcp: load(&self.tcp),
            non_tcp: load(&self.non_tcp),
            malformed: load(&self.malformed),
            resets_sent: load(&self.resets_sent),
            connections_opened: load(&self.connections_opened),
            connections_closed: load(&self.connections_closed),
            connections_rejected: load(&self.connections_rejected),
            retransmissions: load(&self.retransmissions),
            bytes_from_clients: load(&self.bytes_from_clients),
            bytes_to_clients: load(&self.bytes_to_clients),
            packets_by_state: TcpState::ALL
                .iter()
                .map(|state| (state.name().to_string(), self.packets_in_state(*state)))
                .collect(),
        }
    }
}

/// Snapshot of engine statistics (for serialization)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub ipv4: u64,
    pub tcp: u64,
    pub non_tcp: u64,
    pub malformed: u64,
    pub resets_sent: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_rejected: u64,
    pub retransmissions: u64,
    pub bytes_from_clients: u64,
    pub bytes_to_clients: u64,
    pub packets_by_state: BTreeMap<String, u64>,
}
