//! WebSocket transport to the management server.
//!
//! Opens the single socket the client multiplexes over.  The management
//! server sits behind HTTP Basic authentication, so the credentials from
//! [`ConsoleConfig`] are attached to the upgrade request as an
//! `Authorization` header.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::domain::ConsoleConfig;

/// An established management socket.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors that prevent a connection from opening.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The configured URL is not a usable WebSocket URL.
    #[error("invalid management URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The credentials cannot be carried in an HTTP header.
    #[error("credentials are not a valid header value")]
    InvalidCredentials,

    /// TCP connect or WebSocket handshake failed (refused, 401, bad upgrade...).
    #[error("handshake with {url} failed: {source}")]
    Handshake {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The handshake did not finish within the connect timeout.
    #[error("timed out after {0:?} connecting to the management server")]
    Timeout(Duration),
}

/// Builds the `Authorization` header value for HTTP Basic auth.
///
/// ```rust
/// use rproxy_console::infrastructure::transport::basic_auth;
///
/// assert_eq!(basic_auth("admin", "secret"), "Basic YWRtaW46c2VjcmV0");
/// ```
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Opens the management socket described by `config`.
///
/// Resolves once the WebSocket handshake completes.
///
/// # Errors
///
/// Returns [`ConnectionError`] when the URL is invalid, the server cannot be
/// reached or refuses the upgrade, or `config.connect_timeout` elapses.
pub async fn open(config: &ConsoleConfig) -> Result<WsStream, ConnectionError> {
    let mut request =
        config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidUrl {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;

    if let Some((username, password)) = config.credentials() {
        let value = HeaderValue::from_str(&basic_auth(username, password))
            .map_err(|_| ConnectionError::InvalidCredentials)?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    debug!(url = %config.url, "connecting to management server");
    let (ws, response) = tokio::time::timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| ConnectionError::Timeout(config.connect_timeout))?
        .map_err(|source| ConnectionError::Handshake {
            url: config.url.clone(),
            source,
        })?;

    info!(url = %config.url, status = %response.status(), "management socket open");
    Ok(ws)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
