//! Errors observed by callers of the client facade.

use rproxy_core::ProtocolError;
use serde_json::Value;
use thiserror::Error;

/// Why a request, one-shot wait or subscription did not produce a value.
///
/// The type is `Clone` because a single closure event is fanned out to every
/// pending caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
    /// The connection closed while the call was pending, or the call was made
    /// after it had closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The WebSocket handshake never completed.  Calls queued while
    /// connecting are rejected with this.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The server answered with an `error` payload, passed through verbatim.
    ///
    /// The management server sends a plain string message, but nothing here
    /// depends on that.
    #[error("server error: {0}")]
    Application(Value),

    /// The request could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A result or broadcast payload did not have the expected typed shape.
    #[error("unexpected payload shape: {0}")]
    Decode(String),
}

impl RpcError {
    /// Returns the server's message when the error is an application error
    /// carrying a JSON string.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            RpcError::Application(Value::String(message)) => Some(message),
            _ => None,
        }
    }
}
