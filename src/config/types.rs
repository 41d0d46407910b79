//! Configuration types for the TCP engine
//!
//! Configuration is loaded from JSON and validated before the engine starts.
//! Every field has a default, so an empty object `{}` is a valid configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{
    EVENT_QUEUE_CAPACITY, MAX_CONNECTIONS, MAX_UPSTREAM_FRAME_LEN, RETRANSMIT_INTERVAL_MS,
    TCP_IDLE_TIMEOUT_SECS, TCP_MTU, TCP_WINDOW_SIZE, UPSTREAM_CONNECT_TIMEOUT_SECS,
    UPSTREAM_DRAIN_TIMEOUT_MS, UPSTREAM_POLL_INTERVAL_MS,
};
use crate::error::ConfigError;

/// Largest payload that still fits a 1500 byte IPv4 packet with minimal headers
const MAX_MTU: usize = 1460;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Largest payload per outbound segment
    #[serde(default = "default_mtu")]
    pub mtu: usize,

    /// Receive window advertised to clients
    #[serde(default = "default_window_size")]
    pub window_size: u16,

    /// Retransmit interval and connection timer period in milliseconds
    #[serde(default = "default_retransmit_interval_ms")]
    pub retransmit_interval_ms: u64,

    /// Idle time before a connection is reset
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Upstream connect timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Delay between read polls when the relay reported no data
    #[serde(default = "default_upstream_poll_interval_ms")]
    pub upstream_poll_interval_ms: u64,

    /// After the client half-closes, how long the relay may stay silent
    /// before the close request is sent
    #[serde(default = "default_upstream_drain_timeout_ms")]
    pub upstream_drain_timeout_ms: u64,

    /// Largest frame accepted from the relay
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// Maximum concurrently tracked connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Per-connection event queue depth
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Upstream relay endpoint
    #[serde(default)]
    pub relay: ServerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mtu: default_mtu(),
            window_size: default_window_size(),
            retransmit_interval_ms: default_retransmit_interval_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            upstream_poll_interval_ms: default_upstream_poll_interval_ms(),
            upstream_drain_timeout_ms: default_upstream_drain_timeout_ms(),
            max_frame_len: default_max_frame_len(),
            max_connections: default_max_connections(),
            event_queue_capacity: default_event_queue_capacity(),
            relay: ServerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu == 0 || self.mtu > MAX_MTU {
            return Err(ConfigError::ValidationError(format!(
                "mtu must be between 1 and {MAX_MTU}, got {}",
                self.mtu
            )));
        }

        if self.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "window_size must be greater than 0".into(),
            ));
        }

        if self.retransmit_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "retransmit_interval_ms must be greater than 0".into(),
            ));
        }

        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "idle_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.upstream_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "upstream_poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.max_frame_len < usize::from(self.window_size) {
            return Err(ConfigError::ValidationError(format!(
                "max_frame_len ({}) must be at least window_size ({})",
                self.max_frame_len, self.window_size
            )));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.event_queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "event_queue_capacity must be greater than 0".into(),
            ));
        }

        self.relay.validate()
    }

    /// Retransmit interval as a Duration
    #[must_use]
    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    /// Idle timeout as a Duration
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Connect timeout as a Duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Upstream poll interval as a Duration
    #[must_use]
    pub fn upstream_poll_interval(&self) -> Duration {
        Duration::from_millis(self.upstream_poll_interval_ms)
    }

    /// Upstream drain timeout as a Duration
    #[must_use]
    pub fn upstream_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_drain_timeout_ms)
    }
}

/// Address of the upstream relay
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Human-readable name used in logs
    #[serde(default = "default_relay_name")]
    pub name: String,

    /// Relay host (IP address)
    #[serde(default = "default_relay_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_relay_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_relay_name(),
            host: default_relay_host(),
            port: default_relay_port(),
        }
    }
}

impl ServerConfig {
    /// Validate the relay endpoint
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the host is empty or not an
    /// IP address, or the port is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::ValidationError("relay host cannot be empty".into()));
        }

        if self.port == 0 {
            return Err(ConfigError::ValidationError("relay port cannot be 0".into()));
        }

        self.socket_addr().map(|_| ())
    }

    /// Relay socket address
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self.host.parse().map_err(|_| {
            ConfigError::ValidationError(format!("invalid relay host: {}", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_mtu() -> usize {
    TCP_MTU
}

fn default_window_size() -> u16 {
    TCP_WINDOW_SIZE
}

fn default_retransmit_interval_ms() -> u64 {
    RETRANSMIT_INTERVAL_MS
}

fn default_idle_timeout_secs() -> u64 {
    TCP_IDLE_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    UPSTREAM_CONNECT_TIMEOUT_SECS
}

fn default_upstream_poll_interval_ms() -> u64 {
    UPSTREAM_POLL_INTERVAL_MS
}

fn default_upstream_drain_timeout_ms() -> u64 {
    UPSTREAM_DRAIN_TIMEOUT_MS
}

fn default_max_frame_len() -> usize {
    MAX_UPSTREAM_FRAME_LEN
}

fn default_max_connections() -> usize {
    MAX_CONNECTIONS
}

fn default_event_queue_capacity() -> usize {
    EVENT_QUEUE_CAPACITY
}

fn default_relay_name() -> String {
    "relay".into()
}

fn default_relay_host() -> String {
    "127.0.0.1".into()
}

fn default_relay_port() -> u16 {
    1234
}
