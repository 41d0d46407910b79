//! Per-connection driver task
//!
//! Runs the upstream connect, feeds events and timer ticks into the
//! [`TcpConnection`], writes the resulting packets to the tunnel and applies
//! upstream effects. Dropping the task (normal end or abort) closes both
//! straws, aborts the pump and releases the table entry.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::table::ConnectionTable;
use crate::stats::EngineStats;
use crate::tcp::{Effect, Event, TcpConnection};
use crate::upstream::{PumpOptions, UpstreamConnector, UpstreamError, UpstreamPump, UpstreamStream};

pub(crate) struct ConnectionTask {
    id: u64,
    connection: TcpConnection,
    events: mpsc::Receiver<Event>,
    /// Handed to the pump
    events_tx: mpsc::Sender<Event>,
    tunnel: mpsc::Sender<Bytes>,
    connector: Arc<dyn UpstreamConnector>,
    connect_timeout: Duration,
    tick_interval: Duration,
    pump_options: PumpOptions,
    pump: Option<JoinHandle<()>>,
    table: Arc<ConnectionTable>,
    stats: Arc<EngineStats>,
}

pub(crate) struct TaskParams {
    pub tunnel: mpsc::Sender<Bytes>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub connect_timeout: Duration,
    pub tick_interval: Duration,
    pub pump_options: PumpOptions,
    pub table: Arc<ConnectionTable>,
    pub stats: Arc<EngineStats>,
}

impl ConnectionTask {
    pub(crate) fn new(
        id: u64,
        connection: TcpConnection,
        events: mpsc::Receiver<Event>,
        events_tx: mpsc::Sender<Event>,
        params: TaskParams,
    ) -> Self {
        Self {
            id,
            connection,
            events,
            events_tx,
            tunnel: params.tunnel,
            connector: params.connector,
            connect_timeout: params.connect_timeout,
            tick_interval: params.tick_interval,
            pump_options: params.pump_options,
            pump: None,
            table: params.table,
            stats: params.stats,
        }
    }

    pub(crate) async fn run(mut self) {
        let identity = *self.connection.identity();
        let connector = Arc::clone(&self.connector);
        let connect = timeout(self.connect_timeout, async move {
            connector.connect(&identity).await
        });
        tokio::pin!(connect);
        let mut connecting = true;

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                result = &mut connect, if connecting => {
                    connecting = false;
                    let result = result.unwrap_or_else(|_| {
                        Err(UpstreamError::Timeout {
                            timeout_secs: self.connect_timeout.as_secs(),
                        })
                    });
                    self.on_connect(result)
                }
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = ticker.tick() => Event::Tick,
            };

            if self.handle(event).await {
                break;
            }
        }
    }

    fn on_connect(&mut self, result: Result<Box<dyn UpstreamStream>, UpstreamError>) -> Event {
        let identity = *self.connection.identity();
        match result {
            Ok(stream) => {
                let pump = UpstreamPump::new(
                    identity,
                    stream,
                    self.connection.upstream_buffer(),
                    self.connection.downstream_buffer(),
                    self.events_tx.clone(),
                    self.pump_options,
                );
                self.pump = Some(pump.spawn());
                Event::UpstreamConnected
            }
            Err(e) => {
                warn!("{}: upstream connect failed: {}", identity, e);
                Event::UpstreamConnectFailed
            }
        }
    }

    /// Process one event; returns true once the connection is closed
    async fn handle(&mut self, event: Event) -> bool {
        let transition = self.connection.process(event, Instant::now());

        for packet in transition.packets {
            if self.tunnel.send(packet).await.is_err() {
                debug!("{}: tunnel closed", self.connection.identity());
                return true;
            }
        }

        for effect in transition.effects {
            match effect {
                Effect::CloseUpstream => self.connection.upstream_buffer().close(),
                Effect::AbortUpstream => self.abort_upstream(),
            }
        }

        transition.state.is_closed()
    }

    fn abort_upstream(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.connection.upstream_buffer().close();
        self.connection.downstream_buffer().close();
    }
}

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.abort_upstream();
        EngineStats::increment(&self.stats.connections_closed);
        self.table.remove(self.connection.identity(), self.id);
        trace!(
            "{}: connection removed in {}",
            self.connection.identity(),
            self.connection.state()
        );
    }
}
