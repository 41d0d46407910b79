//! Per-connection upstream pump
//!
//! The pump owns the relay stream. It moves client bytes from the upstream
//! straw to the relay and relay bytes into the downstream straw, and tells
//! the connection task about both through its event queue.
//!
//! ```text
//!   upstream straw ──read_max──► [3][len][bytes] ──► relay
//!                                 [len][bytes] ◄──┘
//!   downstream straw ◄──write_all──┘  ──► Event::UpstreamData
//! ```
//!
//! With no client bytes pending the pump polls the relay with bare read
//! requests, backing off by the poll interval after an empty answer. Once
//! the upstream straw is closed and drained the client has half-closed: the
//! pump keeps polling until the relay has been silent for the drain timeout,
//! then sends the close request and stops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use super::connector::UpstreamStream;
use super::error::UpstreamError;
use super::protocol::{read_response, write_request, Request};
use crate::config::EngineConfig;
use crate::straw::{Straw, StrawError};
use crate::tcp::Event;
use crate::wire::Identity;

/// Pump tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpOptions {
    /// Delay before polling again after the relay had nothing to send
    pub poll_interval: Duration,
    /// Largest frame accepted from the relay
    pub max_frame_len: usize,
    /// Largest write request
    pub max_chunk: usize,
    /// Silence tolerated from the relay after the client half-closed
    pub drain_timeout: Duration,
}

impl From<&EngineConfig> for PumpOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.upstream_poll_interval(),
            max_frame_len: config.max_frame_len,
            max_chunk: usize::from(config.window_size),
            drain_timeout: config.upstream_drain_timeout(),
        }
    }
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Moves bytes between one connection's straws and its relay stream
pub struct UpstreamPump {
    identity: Identity,
    stream: Box<dyn UpstreamStream>,
    upstream: Arc<Straw>,
    downstream: Arc<Straw>,
    events: mpsc::Sender<Event>,
    options: PumpOptions,
}

impl UpstreamPump {
    pub fn new(
        identity: Identity,
        stream: Box<dyn UpstreamStream>,
        upstream: Arc<Straw>,
        downstream: Arc<Straw>,
        events: mpsc::Sender<Event>,
        options: PumpOptions,
    ) -> Self {
        Self {
            identity,
            stream,
            upstream,
            downstream,
            events,
            options,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Pump until the stream ends, then report how it ended
    pub async fn run(mut self) {
        let event = match self.pump().await {
            Ok(()) => Event::UpstreamClosed,
            Err(e) if e.is_disconnect() => {
                debug!("{}: relay disconnected: {}", self.identity, e);
                Event::UpstreamClosed
            }
            Err(e) => Event::UpstreamFailed(e.to_string()),
        };

        // The connection may already be gone
        let _ = self.events.send(event).await;
    }

    async fn pump(&mut self) -> Result<(), UpstreamError> {
        let mut delay = Duration::ZERO;
        // Set once the client half-closed; reset whenever the relay sends data
        let mut quiet_since: Option<Instant> = None;

        loop {
            let request = if quiet_since.is_some() {
                sleep(delay).await;
                Request::Read
            } else {
                tokio::select! {
                    biased;
                    read = self.upstream.read_max(self.options.max_chunk) => match read {
                        Ok(data) => Request::Exchange(data),
                        Err(StrawError::Closed) => {
                            debug!("{}: client finished sending, draining relay", self.identity);
                            quiet_since = Some(Instant::now());
                            continue;
                        }
                        Err(e) => return Err(UpstreamError::protocol(e.to_string())),
                    },
                    () = sleep(delay) => Request::Read,
                }
            };

            write_request(&mut self.stream, &request).await?;
            let data = read_response(&mut self.stream, self.options.max_frame_len).await?;
            if data.is_empty() {
                if quiet_since.is_some_and(|since| since.elapsed() >= self.options.drain_timeout) {
                    write_request(&mut self.stream, &Request::Close).await?;
                    debug!("{}: upstream close sent", self.identity);
                    return Ok(());
                }
                delay = self.options.poll_interval;
                continue;
            }

            trace!("{}: {} bytes from relay", self.identity, data.len());
            delay = Duration::ZERO;
            if let Some(since) = quiet_since.as_mut() {
                *since = Instant::now();
            }
            self.downstream
                .write_all(&data)
                .await
                .map_err(|_| UpstreamError::Closed)?;
            if self.events.send(Event::UpstreamData).await.is_err() {
                return Ok(());
            }
        }
    }
}
