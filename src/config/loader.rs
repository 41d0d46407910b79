//! Configuration loading
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use super::types::EngineConfig;
use crate::error::ConfigError;

/// Load configuration from a JSON file
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: EngineConfig = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: mtu={}, window={}, relay={} ({}:{})",
        config.mtu, config.window_size, config.relay.name, config.relay.host, config.relay.port
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `TUNNEL_TCP_RELAY_HOST`: Override relay host
/// - `TUNNEL_TCP_RELAY_PORT`: Override relay port
/// - `TUNNEL_TCP_MAX_CONNECTIONS`: Override max connections
/// - `TUNNEL_TCP_IDLE_TIMEOUT_SECS`: Override idle timeout
///
/// # Errors
///
/// Returns `ConfigError` if loading, parsing or an override fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    // Re-validate after overrides
    config.validate()?;

    Ok(config)
}

/// Apply overrides looked up through `lookup`
fn apply_env_overrides(
    config: &mut EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(host) = lookup("TUNNEL_TCP_RELAY_HOST") {
        config.relay.host = host;
        debug!("Relay host overridden to {}", config.relay.host);
    }

    if let Some(port) = lookup("TUNNEL_TCP_RELAY_PORT") {
        config.relay.port = parse_env("TUNNEL_TCP_RELAY_PORT", &port)?;
        debug!("Relay port overridden to {}", config.relay.port);
    }

    if let Some(max) = lookup("TUNNEL_TCP_MAX_CONNECTIONS") {
        config.max_connections = parse_env("TUNNEL_TCP_MAX_CONNECTIONS", &max)?;
        debug!("Max connections overridden to {}", config.max_connections);
    }

    if let Some(secs) = lookup("TUNNEL_TCP_IDLE_TIMEOUT_SECS") {
        config.idle_timeout_secs = parse_env("TUNNEL_TCP_IDLE_TIMEOUT_SECS", &secs)?;
        debug!("Idle timeout overridden to {}s", config.idle_timeout_secs);
    }

    Ok(())
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvError {
        name: name.into(),
        reason: format!("Invalid number: {value}"),
    })
}

/// Write the default configuration to `path`
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be written.
pub fn create_default_config(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(&EngineConfig::default())
        .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {e}")))?;

    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{ "mtu": 1200, "relay": { "host": "10.1.2.3", "port": 4000 } }"#)
            .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mtu, 1200);
        assert_eq!(config.relay.port, 4000);
        assert_eq!(config.relay.name, "relay");
        assert_eq!(config.window_size, 65_535);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config("/nonexistent/path/config.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_config_str() {
        let config = load_config_str(r#"{ "max_connections": 16 }"#).unwrap();
        assert_eq!(config.max_connections, 16);
    }

    #[test]
    fn test_load_config_invalid_json() {
        let result = load_config_str("not valid json");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_str_fails_validation() {
        let result = load_config_str(r#"{ "window_size": 0 }"#);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_create_default_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        create_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TUNNEL_TCP_RELAY_HOST", "192.168.1.9"),
            ("TUNNEL_TCP_RELAY_PORT", "5555"),
            ("TUNNEL_TCP_IDLE_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        apply_env_overrides(&mut config, |name| vars.get(name).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.relay.host, "192.168.1.9");
        assert_eq!(config.relay.port, 5555);
        assert_eq!(config.idle_timeout_secs, 30);
        assert_eq!(config.max_connections, 4096);
    }

    #[test]
    fn test_env_override_invalid_number() {
        let mut config = EngineConfig::default();
        let result = apply_env_overrides(&mut config, |name| {
            (name == "TUNNEL_TCP_MAX_CONNECTIONS").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(ConfigError::EnvError { .. })));
    }
}
