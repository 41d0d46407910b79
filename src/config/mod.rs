//! Configuration module for tunnel-tcp
//!
//! This module provides configuration types, compile-time defaults and
//! loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use tunnel_tcp::config::{load_config, EngineConfig};
//!
//! let config = load_config("/etc/tunnel-tcp/engine.json").unwrap();
//! println!("Relay: {}:{}", config.relay.host, config.relay.port);
//! ```

pub mod defaults;
mod loader;
mod types;

pub use loader::{create_default_config, load_config, load_config_str, load_config_with_env};
pub use types::{EngineConfig, ServerConfig};
