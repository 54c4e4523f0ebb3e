//! Client configuration
//!
//! Configuration is a sectioned TOML document. Every field has a default, so
//! an empty file (or [`ClientConfig::default`]) describes a client that talks
//! to `127.0.0.1:16677` with an empty client id.
//!
//! ```toml
//! [client]
//! id = "billing-worker"
//! auth_token_env = "ENGINEMQ_TOKEN"
//! max_workers = 4
//! connect_auto_start = true
//!
//! [broker]
//! host = "mq.internal"
//! port = 16677
//!
//! [reconnect]
//! max_wait_ms = 750
//!
//! [publish]
//! timeout_ms = 500
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub publish: PublishSection,
}

/// Identity and login parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    /// Client identifier sent at login (lowercased on the wire)
    #[serde(default)]
    pub id: String,
    /// Literal auth token
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Environment variable holding the auth token
    #[serde(default)]
    pub auth_token_env: Option<String>,
    /// Number of deliveries the broker may have in flight to this client
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    /// Connect as soon as the client is built
    #[serde(default)]
    pub connect_auto_start: bool,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            id: String::new(),
            auth_token: None,
            auth_token_env: None,
            max_workers: default_max_workers(),
            connect_auto_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a single connection attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on a single outbound write. Capped by the heartbeat
    /// interval once the broker has announced one.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Reconnect delays are drawn uniformly from `[0, max_wait_ms]`
    #[serde(default = "default_reconnect_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_wait_ms: default_reconnect_max_wait_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishSection {
    /// Default acknowledgment timeout for `publish`
    #[serde(default = "default_publish_timeout_ms")]
    pub timeout_ms: u64,
    /// Sets the sweep cadence: at most one sweep per half window
    #[serde(default = "default_pending_stale_secs")]
    pub pending_stale_secs: u64,
    /// The sweep only runs once this many publishes are pending
    #[serde(default = "default_pending_sweep_min_len")]
    pub pending_sweep_min_len: usize,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_publish_timeout_ms(),
            pending_stale_secs: default_pending_stale_secs(),
            pending_sweep_min_len: default_pending_sweep_min_len(),
        }
    }
}

fn default_max_workers() -> u32 {
    1
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    16677
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_reconnect_max_wait_ms() -> u64 {
    750
}

fn default_publish_timeout_ms() -> u64 {
    500
}

fn default_pending_stale_secs() -> u64 {
    30
}

fn default_pending_sweep_min_len() -> usize {
    100
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid client ID format: {0}")]
    InvalidClientId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_client_id(&self.client.id)?;

        if self.client.max_workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "client.max_workers must be at least 1".to_string(),
            ));
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.host must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.port must not be 0".to_string(),
            ));
        }
        if self.broker.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.broker.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.write_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.publish.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "publish.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.publish.pending_stale_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "publish.pending_stale_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Auth token to send at login: the literal value wins over the
    /// environment variable. A named but unset variable is an error.
    pub fn resolved_auth_token(&self) -> Result<Option<String>, ConfigError> {
        if let Some(token) = &self.client.auth_token {
            return Ok(Some(token.clone()));
        }
        match &self.client.auth_token_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.write_timeout_ms)
    }

    pub fn reconnect_max_wait(&self) -> Duration {
        Duration::from_millis(self.reconnect.max_wait_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish.timeout_ms)
    }

    pub fn pending_stale_after(&self) -> Duration {
        Duration::from_secs(self.publish.pending_stale_secs)
    }
}

/// Client ids may be empty; otherwise they must match `[a-zA-Z0-9._-]+`
fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    let valid_chars = client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if !valid_chars {
        return Err(ConfigError::InvalidClientId(format!(
            "Client ID '{client_id}' must match pattern [a-zA-Z0-9._-]*"
        )));
    }

    Ok(())
}
