//! TOML configuration for the server binary.
//!
//! Every field has a default, so an absent file or a partial file both work.
//! Example:
//!
//! ```toml
//! [server]
//! name = "Main"
//! log_level = "debug"
//!
//! [network]
//! port = 4410
//! discovery_port = 4411
//!
//! [security]
//! denied_methods = ["*.Shutdown", "Calc.Reset"]
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

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

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub security: SecuritySection,
}

/// Identity and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Name answered to discovery requests.
    #[serde(default = "default_name")]
    pub name: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Port and bind-address settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// IP address to bind the listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port for the invoke channel.
    #[serde(default = "default_port")]
    pub port: u16,
    /// UDP port for discovery requests.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Host written into discovery replies.  Must be reachable by clients;
    /// defaults to the bind address, which only works when that is concrete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_host: Option<String>,
}

/// Method-level access control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SecuritySection {
    /// Denylist patterns, `Object.Method` or `*.Method`.
    #[serde(default)]
    pub denied_methods: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    "Main".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4410
}
fn default_discovery_port() -> u16 {
    4411
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            discovery_port: default_discovery_port(),
            advertise_host: None,
        }
    }
}

/// Loads a config file, returning `ServerConfig::default()` when it does not
/// exist.
pub fn load_config(path: &PathBuf) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.clone(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
