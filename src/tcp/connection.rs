//! Per-connection TCP state machine
//!
//! A [`TcpConnection`] owns the sequence state of one client connection:
//! both flow-control straws, the retransmission queue and the current
//! [`TcpState`]. It never performs I/O. Every input is an [`Event`] and
//! every output is a [`Transition`] carrying the next state, the raw
//! packets to write to the tunnel, and the [`Effect`]s the driver applies to
//! the upstream side.
//!
//! ```text
//!   New ──connected──► Listen ──SYN──► SynReceived ──ACK──► Established
//!                                                          │        │
//!                                    upstream closed, FIN  │        │ client FIN
//!                                                          ▼        ▼
//!        Closed ◄── FinWait2 ◄── FinWait1              CloseWait
//!          ▲                        │                       │ upstream closed, FIN
//!          ├──────── Closing ◄──────┘ client FIN            ▼
//!          └─────────────────────────────────────────── LastAck
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::isn::initial_sequence_number;
use super::reply::{make_packet, reset_for};
use super::retransmission::RetransmissionQueue;
use super::segment::Segment;
use super::sequence::{SequenceNumber, SequenceNumberRange};
use super::state::TcpState;
use crate::config::defaults::{retransmit_interval, tcp_idle_timeout, TCP_MTU, TCP_WINDOW_SIZE};
use crate::config::EngineConfig;
use crate::stats::EngineStats;
use crate::straw::{DownstreamStraw, Straw, UpstreamStraw};
use crate::wire::{tcp_flags, Identity, TcpSegment};

/// Per-connection tunables taken from [`EngineConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Largest payload per outbound segment
    pub mtu: usize,
    /// Capacity of each straw, and the largest window advertised
    pub window_size: u16,
    pub retransmit_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            mtu: TCP_MTU,
            window_size: TCP_WINDOW_SIZE,
            retransmit_interval: retransmit_interval(),
            idle_timeout: tcp_idle_timeout(),
        }
    }
}

impl From<&EngineConfig> for ConnectionOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            mtu: config.mtu,
            window_size: config.window_size,
            retransmit_interval: config.retransmit_interval(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// Input to the state machine
#[derive(Debug, Clone)]
pub enum Event {
    /// Inbound segment from the client
    Packet(TcpSegment),
    /// The upstream connect attempt succeeded
    UpstreamConnected,
    /// The upstream connect attempt failed or timed out
    UpstreamConnectFailed,
    /// The pump wrote relay bytes into the downstream straw
    UpstreamData,
    /// The relay finished sending, or the close request completed
    UpstreamClosed,
    /// Upstream I/O failed
    UpstreamFailed(String),
    /// Periodic timer
    Tick,
}

/// Side effect on the upstream byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Forward what is buffered, then send the close request
    CloseUpstream,
    /// Stop the upstream stream immediately
    AbortUpstream,
}

/// Result of processing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: TcpState,
    /// Raw IPv4 packets for the tunnel, in send order
    pub packets: Vec<Bytes>,
    pub effects: Vec<Effect>,
}

impl Transition {
    #[must_use]
    pub fn to(state: TcpState) -> Self {
        Self {
            state,
            packets: Vec::new(),
            effects: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_packet(mut self, packet: Bytes) -> Self {
        self.packets.push(packet);
        self
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn push(&mut self, packet: Option<Bytes>) {
        self.packets.extend(packet);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

/// State of one tunnel TCP connection
#[derive(Debug)]
pub struct TcpConnection {
    identity: Identity,
    state: TcpState,
    options: ConnectionOptions,
    downstream: DownstreamStraw,
    upstream: UpstreamStraw,
    retransmission: RetransmissionQueue,
    iss: SequenceNumber,
    /// Last window the client advertised
    peer_window: u16,
    /// Receive window carried by the last packets sent
    advertised_window: u16,
    /// Sequence number of our FIN once sent
    fin_sequence: Option<SequenceNumber>,
    upstream_closed: bool,
    /// SYN waiting for the upstream connect to resolve
    held_syn: Option<TcpSegment>,
    syn_ack_sent_at: Option<Instant>,
    last_used: Instant,
    open: bool,
    stats: Arc<EngineStats>,
}

impl TcpConnection {
    /// Connection held in `New` until the upstream connect for `syn` resolves
    #[must_use]
    pub fn new(
        identity: Identity,
        syn: TcpSegment,
        options: ConnectionOptions,
        stats: Arc<EngineStats>,
        now: Instant,
    ) -> Self {
        let mut connection = Self::with_state(identity, TcpState::New, options, stats, now);
        connection.held_syn = Some(syn);
        connection
    }

    /// Connection whose upstream is already available, waiting for a SYN
    #[must_use]
    pub fn listen(
        identity: Identity,
        options: ConnectionOptions,
        stats: Arc<EngineStats>,
        now: Instant,
    ) -> Self {
        Self::with_state(identity, TcpState::Listen, options, stats, now)
    }

    fn with_state(
        identity: Identity,
        state: TcpState,
        options: ConnectionOptions,
        stats: Arc<EngineStats>,
        now: Instant,
    ) -> Self {
        let capacity = usize::from(options.window_size);
        let downstream = Arc::new(Straw::bounded(capacity));
        let upstream = Arc::new(Straw::bounded(capacity));

        Self {
            identity,
            state,
            options,
            downstream: DownstreamStraw::new(downstream, SequenceNumber::ZERO),
            upstream: UpstreamStraw::new(upstream, SequenceNumber::ZERO),
            retransmission: RetransmissionQueue::new(options.retransmit_interval),
            iss: SequenceNumber::ZERO,
            peer_window: 0,
            advertised_window: options.window_size,
            fin_sequence: None,
            upstream_closed: false,
            held_syn: None,
            syn_ack_sent_at: None,
            last_used: now,
            open: true,
            stats,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn state(&self) -> TcpState {
        self.state
    }

    /// False once the connection reached `Closed`
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Client-to-server bytes, read by the upstream pump
    #[must_use]
    pub fn upstream_buffer(&self) -> Arc<Straw> {
        Arc::clone(self.upstream.straw())
    }

    /// Server-to-client bytes, written by the upstream pump
    #[must_use]
    pub fn downstream_buffer(&self) -> Arc<Straw> {
        Arc::clone(self.downstream.straw())
    }

    /// SND.NXT
    #[must_use]
    pub fn sequence_number(&self) -> SequenceNumber {
        self.downstream.sequence_number()
    }

    /// RCV.NXT
    #[must_use]
    pub fn acknowledgement_number(&self) -> SequenceNumber {
        self.upstream.acknowledgement_number()
    }

    /// Segments sent and not yet acknowledged
    #[must_use]
    pub fn unacknowledged_segments(&self) -> usize {
        self.retransmission.len()
    }

    /// Process one event to completion
    pub fn process(&mut self, event: Event, now: Instant) -> Transition {
        let from = self.state;
        let transition = match event {
            Event::Packet(segment) => {
                self.stats.record_packet(from);
                self.last_used = now;
                self.on_packet(segment, now)
            }
            Event::UpstreamConnected => self.on_connected(now),
            Event::UpstreamConnectFailed => self.on_connect_failed(),
            Event::UpstreamData => {
                self.last_used = now;
                self.on_upstream_data(now)
            }
            Event::UpstreamClosed => self.on_upstream_closed(now),
            Event::UpstreamFailed(reason) => self.on_upstream_failed(&reason),
            Event::Tick => self.on_tick(now),
        };

        self.apply(from, transition)
    }

    fn apply(&mut self, from: TcpState, transition: Transition) -> Transition {
        if transition.state != from {
            debug!("{}: {} -> {}", self.identity, from, transition.state);
        }

        self.state = transition.state;
        if !transition.packets.is_empty() {
            self.advertised_window = self.upstream.window_size();
        }
        if self.state.is_closed() {
            self.open = false;
            self.retransmission.clear();
        }
        transition
    }

    fn stay(&self) -> Transition {
        Transition::to(self.state)
    }

    fn on_packet(&mut self, segment: TcpSegment, now: Instant) -> Transition {
        trace!("{}: {} in {}", self.identity, segment, self.state);

        match self.state {
            TcpState::New => {
                trace!("{}: dropping segment before upstream connect", self.identity);
                self.stay()
            }
            TcpState::Listen => self.on_listen(&segment, now),
            TcpState::SynReceived => self.on_syn_received(segment, now),
            TcpState::Established => self.on_established(&segment, now),
            TcpState::FinWait1 => self.on_fin_wait_1(&segment),
            TcpState::FinWait2 => self.on_fin_wait_2(&segment),
            TcpState::CloseWait => self.on_close_wait(&segment, now),
            TcpState::Closing => self.on_closing(&segment),
            TcpState::LastAck => self.on_last_ack(&segment),
            TcpState::Closed => self.stay(),
        }
    }

    // Packet construction

    fn packet(&self, flags: u8, payload: &[u8]) -> Bytes {
        self.packet_at(self.downstream.sequence_number(), flags, payload)
    }

    fn packet_at(&self, sequence_number: SequenceNumber, flags: u8, payload: &[u8]) -> Bytes {
        make_packet(
            &self.identity,
            sequence_number,
            self.upstream.acknowledgement_number(),
            flags,
            self.upstream.window_size(),
            payload,
        )
    }

    fn ack(&self) -> Bytes {
        self.packet(tcp_flags::ACK, &[])
    }

    fn syn_ack(&self) -> Bytes {
        self.packet_at(self.iss, tcp_flags::SYN | tcp_flags::ACK, &[])
    }

    /// `<SEQ=SND.NXT><CTL=RST>`
    fn reset(&self) -> Bytes {
        EngineStats::increment(&self.stats.resets_sent);
        make_packet(
            &self.identity,
            self.downstream.sequence_number(),
            SequenceNumber::ZERO,
            tcp_flags::RST,
            0,
            &[],
        )
    }

    fn reset_for(&self, segment: &TcpSegment) -> Option<Bytes> {
        let packet = reset_for(segment)?;
        EngineStats::increment(&self.stats.resets_sent);
        Some(packet)
    }

    // Shared steps

    /// Checks every synchronized state applies before its own handling
    ///
    /// Returns the transition when the segment is fully handled here.
    fn screen(&self, segment: &TcpSegment) -> Option<Transition> {
        if segment.is_rst() {
            if self.upstream.receive_window().contains(segment.sequence_number) {
                debug!("{}: reset by client in {}", self.identity, self.state);
                return Some(Transition::to(TcpState::Closed).with_effect(Effect::AbortUpstream));
            }
            return Some(self.stay().with_packet(self.ack()));
        }

        if !self.upstream.in_window(segment.sequence_number, segment.payload.len()) {
            trace!(
                "{}: out of window seq {} (expected {})",
                self.identity,
                segment.sequence_number,
                self.upstream.acknowledgement_number()
            );
            return Some(self.stay().with_packet(self.ack()));
        }

        if segment.is_syn() {
            debug!("{}: SYN in {}, resetting", self.identity, self.state);
            return Some(
                Transition::to(TcpState::Closed)
                    .with_packet(self.reset())
                    .with_effect(Effect::AbortUpstream),
            );
        }

        if !segment.is_ack() {
            trace!("{}: dropping segment without ACK", self.identity);
            return Some(self.stay());
        }

        None
    }

    /// Apply SEG.ACK and SEG.WND
    ///
    /// Returns false when the ACK covers data never sent.
    fn apply_ack(&mut self, segment: &TcpSegment) -> bool {
        let ack = segment.acknowledgement_number;
        if self.downstream.sequence_number() < ack {
            trace!("{}: ack {} beyond SND.NXT", self.identity, ack);
            return false;
        }

        if self.downstream.unacknowledged() < ack {
            match self.downstream.acknowledge(ack) {
                Ok(released) => {
                    let segments = self.retransmission.acknowledge(ack);
                    trace!(
                        "{}: ack {} released {} bytes, {} segments",
                        self.identity,
                        ack,
                        released,
                        segments
                    );
                }
                Err(error) => {
                    debug!("{}: {}", self.identity, error);
                    return false;
                }
            }
        }

        self.peer_window = segment.window;
        true
    }

    /// Accept client payload into the upstream straw
    ///
    /// Returns false when the payload could not be taken.
    fn accept_payload(&mut self, segment: &TcpSegment) -> bool {
        if segment.payload.is_empty() {
            return true;
        }

        match self.upstream.write(segment.sequence_number, &segment.payload) {
            Ok(()) => {
                EngineStats::add(&self.stats.bytes_from_clients, segment.payload.len());
                true
            }
            Err(error) => {
                debug!("{}: dropping payload: {}", self.identity, error);
                false
            }
        }
    }

    /// Send at most one segment of unsent downstream data
    fn drain(&mut self, now: Instant) -> Option<Bytes> {
        let window = self.downstream.next_window(self.options.mtu, self.peer_window)?;
        let data = match self.downstream.read(&window) {
            Ok(data) => data,
            Err(error) => {
                debug!("{}: {}", self.identity, error);
                return None;
            }
        };
        if let Err(error) = self.downstream.mark_sent(&window) {
            debug!("{}: {}", self.identity, error);
            return None;
        }

        EngineStats::add(&self.stats.bytes_to_clients, data.len());
        let packet = self.packet_at(window.lower_bound(), tcp_flags::ACK | tcp_flags::PSH, &data);
        self.retransmission.add(Segment::new(data, window, now));
        Some(packet)
    }

    fn send_fin(&mut self, now: Instant) -> Bytes {
        let sequence_number = self.downstream.sequence_number();
        self.fin_sequence = Some(sequence_number);
        self.downstream.increment_for_control();
        self.retransmission.add(Segment::fin(sequence_number, now));
        self.packet_at(sequence_number, tcp_flags::FIN | tcp_flags::ACK, &[])
    }

    fn fin_acknowledged(&self) -> bool {
        self.fin_sequence.is_some() && self.downstream.is_fully_acknowledged()
    }

    /// Send our FIN once the relay is done and every byte went out
    fn ready_to_close(&self) -> bool {
        self.upstream_closed && self.fin_sequence.is_none() && self.downstream.is_fully_sent()
    }

    /// Progress an Established or CloseWait connection after new data or acks
    fn send_pending(&mut self, mut transition: Transition, now: Instant) -> Transition {
        if !self.ready_to_close() {
            return transition;
        }

        transition.packets.push(self.send_fin(now));
        match self.state {
            TcpState::Established => {
                debug!("{}: upstream closed, sending FIN", self.identity);
                transition.state = TcpState::FinWait1;
            }
            TcpState::CloseWait => {
                transition.state = TcpState::LastAck;
                transition.effects.push(Effect::CloseUpstream);
            }
            _ => {}
        }
        transition
    }

    // Handshake

    fn accept_syn(&mut self, syn: &TcpSegment, now: Instant) -> Transition {
        self.iss = initial_sequence_number();
        self.upstream = UpstreamStraw::new(self.upstream_buffer(), syn.sequence_number.increment());
        self.downstream = DownstreamStraw::new(self.downstream_buffer(), self.iss.increment());
        self.peer_window = syn.window;
        self.syn_ack_sent_at = Some(now);

        Transition::to(TcpState::SynReceived).with_packet(self.syn_ack())
    }

    fn on_listen(&mut self, segment: &TcpSegment, now: Instant) -> Transition {
        if segment.is_rst() {
            return Transition::to(TcpState::Closed).with_effect(Effect::AbortUpstream);
        }

        if !segment.is_bare_syn() {
            debug!("{}: {} in LISTEN, resetting", self.identity, segment.flags_string());
            let mut transition = Transition::to(TcpState::Closed).with_effect(Effect::AbortUpstream);
            transition.push(self.reset_for(segment));
            return transition;
        }

        self.accept_syn(segment, now)
    }

    fn on_syn_received(&mut self, segment: TcpSegment, now: Instant) -> Transition {
        if segment.is_rst() {
            if self.upstream.receive_window().contains(segment.sequence_number) {
                return Transition::to(TcpState::Closed).with_effect(Effect::AbortUpstream);
            }
            return self.stay();
        }

        if segment.is_bare_syn() {
            return self.accept_syn(&segment, now);
        }

        if !self.upstream.in_window(segment.sequence_number, segment.payload.len()) {
            trace!(
                "{}: out of window seq {} in SYN-RECEIVED",
                self.identity,
                segment.sequence_number
            );
            return self.stay().with_packet(self.ack());
        }

        if !segment.is_ack() {
            self.syn_ack_sent_at = Some(now);
            return self.stay().with_packet(self.syn_ack());
        }

        let acceptable = SequenceNumberRange::new(self.iss, self.downstream.sequence_number());
        if !acceptable.contains(segment.acknowledgement_number) {
            debug!(
                "{}: unacceptable ack {} in SYN-RECEIVED",
                self.identity, segment.acknowledgement_number
            );
            let mut transition = self.stay();
            transition.push(self.reset_for(&segment));
            return transition;
        }

        self.syn_ack_sent_at = None;
        self.state = TcpState::Established;
        self.on_established(&segment, now)
    }

    // Synchronized states

    fn on_established(&mut self, segment: &TcpSegment, now: Instant) -> Transition {
        if let Some(transition) = self.screen(segment) {
            return transition;
        }
        if !self.apply_ack(segment) {
            return self.stay().with_packet(self.ack());
        }
        if !self.accept_payload(segment) {
            return self.stay().with_packet(self.ack());
        }

        if segment.is_fin() {
            self.upstream.increment();
            return Transition::to(TcpState::CloseWait)
                .with_packet(self.ack())
                .with_effect(Effect::CloseUpstream);
        }

        let mut transition = self.stay();
        match self.drain(now) {
            Some(packet) => transition.packets.push(packet),
            None if !segment.payload.is_empty() => transition.packets.push(self.ack()),
            None => {}
        }
        self.send_pending(transition, now)
    }

    fn on_close_wait(&mut self, segment: &TcpSegment, now: Instant) -> Transition {
        if let Some(transition) = self.screen(segment) {
            return transition;
        }
        if !self.apply_ack(segment) || !segment.payload.is_empty() {
            return self.stay().with_packet(self.ack());
        }

        let mut transition = self.stay();
        transition.push(self.drain(now));
        self.send_pending(transition, now)
    }

    fn on_fin_wait_1(&mut self, segment: &TcpSegment) -> Transition {
        if let Some(transition) = self.screen(segment) {
            return transition;
        }
        if !self.apply_ack(segment) {
            return self.stay().with_packet(self.ack());
        }
        self.accept_payload(segment);

        if segment.is_fin() {
            self.upstream.increment();
            return Transition::to(TcpState::Closing).with_packet(self.ack());
        }

        let next = if self.fin_acknowledged() {
            TcpState::FinWait2
        } else {
            self.state
        };
        let mut transition = Transition::to(next);
        if !segment.payload.is_empty() {
            transition.packets.push(self.ack());
        }
        transition
    }

    fn on_fin_wait_2(&mut self, segment: &TcpSegment) -> Transition {
        if let Some(transition) = self.screen(segment) {
            return transition;
        }
        if !self.apply_ack(segment) {
            return self.stay().with_packet(self.ack());
        }
        self.accept_payload(segment);

        if segment.is_fin() {
            self.upstream.increment();
            return Transition::to(TcpState::Closed).with_packet(self.ack());
        }

        let mut transition = self.stay();
        if !segment.payload.is_empty() {
            transition.packets.push(self.ack());
        }
        transition
    }

    fn on_closing(&mut self, segment: &TcpSegment) -> Transition {
        if let Some(transition) = self.screen(segment) {
            return transition;
        }
        if !self.apply_ack(segment) {
            return self.stay().with_packet(self.ack());
        }

        if self.fin_acknowledged() {
            Transition::to(TcpState::Closed)
        } else {
            self.stay()
        }
    }

    fn on_last_ack(&mut self, segment: &TcpSegment) -> Transition {
        if let Some(transition) = self.screen(segment) {
            return transition;
        }
        let Some(fin) = self.fin_sequence else {
            return self.stay();
        };

        if self.apply_ack(segment) && segment.acknowledgement_number == fin.increment() {
            return Transition::to(TcpState::Closed);
        }

        self.stay()
            .with_packet(self.packet_at(fin, tcp_flags::FIN | tcp_flags::ACK, &[]))
    }

    // Upstream events

    fn on_connected(&mut self, now: Instant) -> Transition {
        if self.state != TcpState::New {
            return self.stay();
        }

        self.state = TcpState::Listen;
        match self.held_syn.take() {
            Some(syn) => self.on_listen(&syn, now),
            None => Transition::to(TcpState::Listen),
        }
    }

    fn on_connect_failed(&mut self) -> Transition {
        let mut transition = Transition::to(TcpState::Closed);
        if let Some(syn) = self.held_syn.take() {
            transition.push(self.reset_for(&syn));
        }
        transition
    }

    fn on_upstream_data(&mut self, now: Instant) -> Transition {
        if !self.state.can_send() {
            return self.stay();
        }

        let mut transition = self.stay();
        transition.push(self.drain(now));
        self.send_pending(transition, now)
    }

    fn on_upstream_closed(&mut self, now: Instant) -> Transition {
        self.upstream_closed = true;
        if !self.state.can_send() {
            return self.stay();
        }

        let mut transition = self.stay();
        transition.push(self.drain(now));
        self.send_pending(transition, now)
    }

    fn on_upstream_failed(&mut self, reason: &str) -> Transition {
        warn!("{}: upstream failed in {}: {}", self.identity, self.state, reason);

        let mut transition = Transition::to(TcpState::Closed).with_effect(Effect::AbortUpstream);
        match self.state {
            TcpState::New => {
                if let Some(syn) = self.held_syn.take() {
                    transition.push(self.reset_for(&syn));
                }
            }
            TcpState::Listen | TcpState::Closed => {}
            _ => transition.packets.push(self.reset()),
        }
        transition
    }

    fn on_tick(&mut self, now: Instant) -> Transition {
        if matches!(self.state, TcpState::New | TcpState::Closed) {
            return self.stay();
        }

        if now.saturating_duration_since(self.last_used) >= self.options.idle_timeout {
            debug!("{}: idle in {}, resetting", self.identity, self.state);
            let mut transition = Transition::to(TcpState::Closed).with_effect(Effect::AbortUpstream);
            if self.state != TcpState::Listen {
                transition.packets.push(self.reset());
            }
            return transition;
        }

        match self.state {
            TcpState::SynReceived => self.resend_syn_ack(now),
            TcpState::Closing if self.fin_acknowledged() => Transition::to(TcpState::Closed),
            state if state.is_synchronized() => {
                let transition = self.retransmit(now);
                if transition.packets.is_empty() && self.window_reopened() {
                    trace!("{}: receive window reopened", self.identity);
                    return transition.with_packet(self.ack());
                }
                transition
            }
            _ => self.stay(),
        }
    }

    /// True when the client last saw a zero window and the pump has since
    /// drained the upstream straw
    fn window_reopened(&self) -> bool {
        let receiving = matches!(
            self.state,
            TcpState::Established | TcpState::FinWait1 | TcpState::FinWait2
        );
        receiving && self.advertised_window == 0 && self.upstream.window_size() > 0
    }

    fn resend_syn_ack(&mut self, now: Instant) -> Transition {
        let due = self
            .syn_ack_sent_at
            .map_or(true, |sent| now.saturating_duration_since(sent) >= self.options.retransmit_interval);
        if !due {
            return self.stay();
        }

        self.syn_ack_sent_at = Some(now);
        EngineStats::increment(&self.stats.retransmissions);
        self.stay().with_packet(self.syn_ack())
    }

    fn retransmit(&mut self, now: Instant) -> Transition {
        let due = self
            .retransmission
            .next(now)
            .map(|segment| (segment.window(), segment.data().clone(), segment.is_fin()));

        match due {
            Ok((window, data, fin)) => {
                let flags = if fin {
                    tcp_flags::FIN | tcp_flags::ACK
                } else {
                    tcp_flags::ACK | tcp_flags::PSH
                };
                let packet = self.packet_at(window.lower_bound(), flags, &data);
                if let Err(error) = self.retransmission.mark_resent(window.lower_bound(), now) {
                    debug!("{}: {}", self.identity, error);
                }
                EngineStats::increment(&self.stats.retransmissions);
                trace!("{}: retransmitting {}", self.identity, window);
                self.stay().with_packet(packet)
            }
            Err(error) if error.is_control_signal() => {
                if !self.state.can_send() {
                    return self.stay();
                }
                let mut transition = self.stay();
                transition.push(self.drain(now));
                self.send_pending(transition, now)
            }
            Err(error) => {
                debug!("{}: {}", self.identity, error);
                self.stay()
            }
        }
    }
}
