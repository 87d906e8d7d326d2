//! Configuration for the outbox core.
//!
//! Supports YAML file and environment variable overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::broker::topology::{DEFAULT_MAX_QUEUE_LENGTH, DEFAULT_MESSAGE_TTL_MS, EVENTS_EXCHANGE};

/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "RELAYBOX_CONFIG";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "RELAYBOX_LOG";
/// Environment variable for the SQLite database path.
pub const STORAGE_PATH_ENV_VAR: &str = "STORAGE_PATH";
/// Environment variable for the PostgreSQL connection URL.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";
/// Environment variable for the AMQP connection URL.
pub const AMQP_URL_ENV_VAR: &str = "AMQP_URL";
/// Environment variable for the broker publish timeout.
pub const PUBLISH_TIMEOUT_ENV_VAR: &str = "PUBLISH_TIMEOUT_SECS";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Broker configuration.
    pub broker: BrokerConfig,
    /// Tenant queue topology limits (shared with provisioning).
    pub topology: TopologyConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type (sqlite or postgres).
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Path to the SQLite database file.
    pub path: String,
    /// PostgreSQL connection URL (postgres only).
    pub url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "sqlite".to_string(),
            path: "./data/relaybox.db".to_string(),
            url: None,
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// AMQP connection URL.
    pub url: String,
    /// Exchange events are published to.
    pub exchange: String,
    /// Hard bound on one publish attempt, in seconds. Keeps the recording
    /// write path responsive when the broker is down.
    pub publish_timeout_secs: u64,
}

impl BrokerConfig {
    /// The publish timeout as a `Duration`.
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            exchange: EVENTS_EXCHANGE.to_string(),
            publish_timeout_secs: 5,
        }
    }
}

/// Tenant queue limits. Must match what provisioning declares.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Per-message TTL in the tenant queue, milliseconds.
    pub message_ttl_ms: u64,
    /// Maximum tenant queue length before overflow dead-letters.
    pub max_queue_length: u64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            message_ttl_ms: DEFAULT_MESSAGE_TTL_MS,
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(STORAGE_PATH_ENV_VAR) {
            self.storage.path = path;
        }

        if let Ok(url) = std::env::var(DATABASE_URL_ENV_VAR) {
            self.storage.url = Some(url);
        }

        if let Ok(url) = std::env::var(AMQP_URL_ENV_VAR) {
            self.broker.url = url;
        }

        if let Ok(timeout) = std::env::var(PUBLISH_TIMEOUT_ENV_VAR) {
            if let Ok(secs) = timeout.parse() {
                self.broker.publish_timeout_secs = secs;
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.storage_type, "sqlite");
        assert_eq!(config.storage.path, "./data/relaybox.db");
        assert_eq!(config.broker.url, "amqp://localhost:5672");
        assert_eq!(config.broker.exchange, "relaybox.events");
        assert_eq!(config.broker.publish_timeout_secs, 5);
        assert_eq!(config.topology.message_ttl_ms, 86_400_000);
        assert_eq!(config.topology.max_queue_length, 100_000);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
storage:
  type: postgres
  url: postgres://relaybox:secret@db:5432/relaybox

broker:
  url: amqp://broker:5672
  publish_timeout_secs: 3

topology:
  message_ttl_ms: 3600000
  max_queue_length: 5000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.storage_type, "postgres");
        assert_eq!(
            config.storage.url.as_deref(),
            Some("postgres://relaybox:secret@db:5432/relaybox")
        );
        assert_eq!(config.broker.url, "amqp://broker:5672");
        assert_eq!(config.broker.publish_timeout_secs, 3);
        // unset sections keep defaults
        assert_eq!(config.broker.exchange, "relaybox.events");
        assert_eq!(config.topology.message_ttl_ms, 3_600_000);
        assert_eq!(config.topology.max_queue_length, 5_000);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(AMQP_URL_ENV_VAR, "amqp://other:5672");
        std::env::set_var(PUBLISH_TIMEOUT_ENV_VAR, "9");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.broker.url, "amqp://other:5672");
        assert_eq!(config.broker.publish_timeout_secs, 9);

        std::env::remove_var(AMQP_URL_ENV_VAR);
        std::env::remove_var(PUBLISH_TIMEOUT_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_env_override_ignores_malformed_timeout() {
        std::env::set_var(PUBLISH_TIMEOUT_ENV_VAR, "soon");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.broker.publish_timeout_secs, 5);

        std::env::remove_var(PUBLISH_TIMEOUT_ENV_VAR);
    }
}
