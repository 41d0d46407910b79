//! Inbound packet demultiplexer
//!
//! [`TcpProxy`] owns the connection table. Each inbound packet is parsed,
//! keyed by its identity and handed to the matching connection task. Packets
//! for unknown identities are answered per RFC 793's CLOSED state, except
//! that a SYN opens a new connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::error::ProxyError;
use super::table::ConnectionTable;
use super::task::{ConnectionTask, TaskParams};
use crate::config::EngineConfig;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::tcp::{reset_for, ConnectionOptions, Event, TcpConnection};
use crate::upstream::{PumpOptions, UpstreamConnector};
use crate::wire::{parse_packet, PacketError, TcpSegment};

/// User-space TCP endpoint for every connection arriving over the tunnel
pub struct TcpProxy {
    table: Arc<ConnectionTable>,
    connector: Arc<dyn UpstreamConnector>,
    tunnel: mpsc::Sender<Bytes>,
    options: ConnectionOptions,
    pump_options: PumpOptions,
    connect_timeout: Duration,
    event_queue_capacity: usize,
    stats: Arc<EngineStats>,
}

impl TcpProxy {
    /// Create a proxy writing outbound packets to `tunnel`
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        connector: Arc<dyn UpstreamConnector>,
        tunnel: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            table: Arc::new(ConnectionTable::new(config.max_connections)),
            connector,
            tunnel,
            options: ConnectionOptions::from(config),
            pump_options: PumpOptions::from(config),
            connect_timeout: config.connect_timeout(),
            event_queue_capacity: config.event_queue_capacity,
            stats: EngineStats::new(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counters, for callers that poll them directly
    #[must_use]
    pub fn engine_stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    /// Handle one raw IPv4 packet from the tunnel
    ///
    /// # Errors
    ///
    /// - [`ProxyError::Packet`] if the packet is not valid IPv4/TCP (it is dropped)
    /// - [`ProxyError::TableFull`] if a new connection was refused
    /// - [`ProxyError::TunnelClosed`] if a reply could not be written
    pub async fn process_inbound_packet(&self, packet: &[u8]) -> Result<(), ProxyError> {
        EngineStats::increment(&self.stats.messages);

        let segment = match parse_packet(packet) {
            Ok(segment) => segment,
            Err(e) => {
                if e.is_unsupported() {
                    EngineStats::increment(&self.stats.ipv4);
                    EngineStats::increment(&self.stats.non_tcp);
                } else {
                    EngineStats::increment(&self.stats.malformed);
                }
                trace!("Dropping inbound packet: {}", e);
                return Err(e.into());
            }
        };
        EngineStats::increment(&self.stats.ipv4);
        EngineStats::increment(&self.stats.tcp);

        if let Some(events) = self.table.sender(&segment.identity) {
            let identity = segment.identity;
            match events.try_send(Event::Packet(segment)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!("{}: event queue full, dropping segment", identity);
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("{}: connection finishing, dropping segment", identity);
                }
            }
            return Ok(());
        }

        if segment.is_rst() {
            trace!("{}: RST for unknown connection", segment.identity);
            return Ok(());
        }

        if segment.is_ack() {
            debug!("{}: ACK for unknown connection, resetting", segment.identity);
            return self.send_reset(&segment).await;
        }

        if segment.is_syn() {
            return self.open(segment).await;
        }

        trace!(
            "{}: dropping {} for unknown connection",
            segment.identity,
            segment.flags_string()
        );
        Ok(())
    }

    async fn send_reset(&self, segment: &TcpSegment) -> Result<(), ProxyError> {
        let Some(reset) = reset_for(segment) else {
            return Ok(());
        };
        EngineStats::increment(&self.stats.resets_sent);
        self.tunnel.send(reset).await.map_err(|_| ProxyError::TunnelClosed)
    }

    /// Admit a new connection for `syn` and start its upstream connect
    async fn open(&self, syn: TcpSegment) -> Result<(), ProxyError> {
        let identity = syn.identity;
        if self.table.is_full() {
            warn!(
                "{}: connection table full ({}), refusing",
                identity,
                self.table.max_connections()
            );
            EngineStats::increment(&self.stats.connections_rejected);
            self.send_reset(&syn).await?;
            return Err(ProxyError::TableFull(self.table.max_connections()));
        }

        let connection = TcpConnection::new(
            identity,
            syn,
            self.options,
            Arc::clone(&self.stats),
            Instant::now(),
        );

        let inserted = self.table.insert_with(identity, |id| {
            let (events_tx, events_rx) = mpsc::channel(self.event_queue_capacity);
            let params = TaskParams {
                tunnel: self.tunnel.clone(),
                connector: Arc::clone(&self.connector),
                connect_timeout: self.connect_timeout,
                tick_interval: self.options.retransmit_interval,
                pump_options: self.pump_options,
                table: Arc::clone(&self.table),
                stats: Arc::clone(&self.stats),
            };
            let task = ConnectionTask::new(id, connection, events_rx, events_tx.clone(), params);
            (events_tx, tokio::spawn(task.run()))
        });

        if inserted {
            EngineStats::increment(&self.stats.connections_opened);
            debug!("{}: new connection, connecting upstream", identity);
        }
        Ok(())
    }

    /// Feed packets from `inbound` until it ends or `shutdown` fires
    ///
    /// Malformed packets are logged and skipped. The loop stops early only
    /// if the tunnel sink is gone.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Bytes>, mut shutdown: oneshot::Receiver<()>) {
        info!("TCP proxy started (max {} connections)", self.table.max_connections());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("TCP proxy received shutdown signal");
                    break;
                }
                packet = inbound.recv() => {
                    let Some(packet) = packet else {
                        debug!("Tunnel inbound channel closed");
                        break;
                    };
                    if let Err(e) = self.process_inbound_packet(&packet).await {
                        if !e.is_recoverable() {
                            warn!("TCP proxy stopping: {}", e);
                            break;
                        }
                        if !matches!(e, ProxyError::Packet(PacketError::NotTcp(_))) {
                            debug!("{}", e);
                        }
                    }
                }
            }
        }

        self.shutdown();
    }

    /// Abort every connection task
    pub fn shutdown(&self) {
        let aborted = self.table.abort_all();
        info!("TCP proxy shut down, aborted {} connections", aborted);
    }
}

impl Drop for TcpProxy {
    fn drop(&mut self) {
        self.table.abort_all();
    }
}
