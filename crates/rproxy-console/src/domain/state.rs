//! Connection state.

use std::fmt;

/// Lifecycle of one client connection.
///
/// ```text
/// Connecting ──handshake ok──▶ Open ──close / error──▶ Closed
///      └──────────handshake failed──────────────────────▲
/// ```
///
/// `Closed` is terminal: a closed client is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// The WebSocket handshake has not completed yet.  Requests are queued.
    #[default]
    Connecting,
    /// Requests are written immediately and inbound frames are routed.
    Open,
    /// Every pending request has been rejected; nothing more is accepted.
    Closed,
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
