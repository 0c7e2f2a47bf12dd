//! TOML config file for the console.
//!
//! The file is optional; every field has a default and command-line flags
//! override whatever the file says.
//!
//! ```toml
//! [connection]
//! url = "ws://proxy.lan:8080/socket"
//! username = "admin"
//! password = "secret"
//! connect_timeout_secs = 5
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when absent, so a partial file (or none at all) still yields
//! a complete configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ConsoleConfig;

/// Error type for config file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── File schema ───────────────────────────────────────────────────────────────

/// On-disk layout of the console config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[connection]`: where and how to reach the management socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_url() -> String {
    ConsoleConfig::default().url
}
fn default_connect_timeout_secs() -> u64 {
    ConsoleConfig::default().connect_timeout.as_secs()
}
fn default_log_level() -> String {
    ConsoleConfig::default().log_level
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl From<ConfigFile> for ConsoleConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            url: file.connection.url,
            username: file.connection.username,
            password: file.connection.password,
            connect_timeout: Duration::from_secs(file.connection.connect_timeout_secs),
            log_level: file.logging.level,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses a config file's text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<ConsoleConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(content)?;
    Ok(file.into())
}

/// Loads the console config from `path`, returning defaults when the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ConsoleConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConsoleConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
