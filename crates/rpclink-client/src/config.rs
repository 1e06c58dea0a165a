//! TOML configuration for the client binary.
//!
//! Every field defaults, so a missing or partial file works.  When
//! `server.host` is set the client connects directly; otherwise it
//! broadcasts discovery for `server.name`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level client configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

/// Which server to talk to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Server name used in discovery requests.
    #[serde(default = "default_name")]
    pub name: String,
    /// Direct host; when absent, discovery resolves the address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// TCP port for direct connections.
    #[serde(default = "default_port")]
    pub port: u16,
    /// UDP port for discovery broadcasts.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
}

/// Connection-management tunables, mirrored onto [`ClientOptions`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: u32,
    #[serde(default = "default_escalated_interval_ms")]
    pub escalated_interval_ms: u64,
    #[serde(default)]
    pub raise_on_failure: bool,
    /// `tracing` log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ClientSection {
    pub fn to_options(&self) -> ClientOptions {
        ClientOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            retry_threshold: self.retry_threshold,
            escalated_interval: Duration::from_millis(self.escalated_interval_ms),
            raise_on_failure: self.raise_on_failure,
        }
    }
}

fn default_name() -> String {
    "Main".to_string()
}
fn default_port() -> u16 {
    4410
}
fn default_discovery_port() -> u16 {
    4411
}
fn default_read_timeout_ms() -> u64 {
    5000
}
fn default_reconnect_interval_ms() -> u64 {
    1000
}
fn default_retry_threshold() -> u32 {
    5
}
fn default_escalated_interval_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            host: None,
            port: default_port(),
            discovery_port: default_discovery_port(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            retry_threshold: default_retry_threshold(),
            escalated_interval_ms: default_escalated_interval_ms(),
            raise_on_failure: false,
            log_level: default_log_level(),
        }
    }
}

/// Loads a config file, returning `ClientConfig::default()` when it does not
/// exist.
pub fn load_config(path: &PathBuf) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.clone(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
