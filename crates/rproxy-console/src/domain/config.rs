//! Console configuration types.
//!
//! [`ConsoleConfig`] is the single source of truth for how the client
//! reaches the management server.  It is a plain struct: the binary fills it
//! from the config file and CLI flags, tests build it directly.

use std::time::Duration;

/// Everything needed to open a management connection.
///
/// # Example
///
/// ```rust
/// use rproxy_console::ConsoleConfig;
///
/// let cfg = ConsoleConfig::default();
/// assert_eq!(cfg.url, "ws://127.0.0.1:8080/socket");
/// assert!(cfg.credentials().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// WebSocket URL of the management endpoint, normally ending in `/socket`.
    pub url: String,

    /// HTTP Basic user name.  No `Authorization` header is sent when absent.
    pub username: Option<String>,

    /// HTTP Basic password.  Treated as empty when a user name is set
    /// without one.
    pub password: Option<String>,

    /// Upper bound on TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl ConsoleConfig {
    /// Returns a config pointing at `url` with every other field defaulted.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Returns `(username, password)` when Basic credentials are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref().unwrap_or("")))
    }
}

impl Default for ConsoleConfig {
    /// | Field           | Default                       |
    /// |-----------------|-------------------------------|
    /// | url             | `ws://127.0.0.1:8080/socket`  |
    /// | username        | none                          |
    /// | password        | none                          |
    /// | connect_timeout | 10 seconds                    |
    /// | log_level       | `info`                        |
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/socket".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
