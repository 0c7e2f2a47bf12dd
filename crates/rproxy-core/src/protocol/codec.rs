//! JSON codec for management socket frames.
//!
//! Wire format (one WebSocket text frame per envelope):
//! ```text
//! request    {"id": <id>, "method": <string>, "params": <any>}
//! response   {"id": <id>, "result": <any>}  |  {"id": <id>, "error": <any>}
//! broadcast  {"id": <negative channel id>, "result": <any>}
//! ```
//!
//! Decoding never panics.  Anything that does not fit the shapes above is
//! reported as a [`ProtocolError`]; callers log and drop the frame rather than
//! tearing down the connection.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::protocol::channels::BroadcastChannel;
use crate::protocol::envelope::{InboundFrame, RequestFrame, RequestId};
use crate::protocol::methods::Method;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// The text is not JSON, or the JSON does not have the envelope shape
    /// (missing or non-integer `id`, wrong field types, ...).
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The frame used id `0`, which is reserved on both directions.
    #[error("frame id 0 is reserved")]
    ZeroId,

    /// A request frame carried a non-positive id.
    #[error("request id must be positive, got {0}")]
    InvalidRequestId(i64),

    /// The frame carried neither `result` nor `error`.
    #[error("frame {id} carries neither a result nor an error")]
    MissingPayload { id: i64 },

    /// The envelope could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OutboundRequest<'a> {
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Serialize)]
struct OutboundResult<'a> {
    id: i64,
    result: &'a Value,
}

#[derive(Serialize)]
struct OutboundError<'a> {
    id: i64,
    error: &'a Value,
}

#[derive(Deserialize)]
struct RawFrame {
    id: i64,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct RawRequest {
    id: i64,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Distinguishes `"result": null` (present) from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn to_text<T: Serialize>(frame: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(|e| ProtocolError::Encode(e.to_string()))
}

// ── Client side ───────────────────────────────────────────────────────────────

/// Encodes a request envelope.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use rproxy_core::protocol::{encode_request, Method, RequestId};
/// use serde_json::json;
///
/// let text = encode_request(RequestId::FIRST, Method::Add, &json!("srv1")).unwrap();
/// assert_eq!(text, r#"{"id":1,"method":"add","params":"srv1"}"#);
/// ```
pub fn encode_request(id: RequestId, method: Method, params: &Value) -> Result<String, ProtocolError> {
    to_text(&OutboundRequest {
        id: id.get(),
        method: method.as_str(),
        params,
    })
}

/// Decodes one frame received by the client.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is malformed, uses id `0`, or
/// carries no payload.
///
/// # Examples
///
/// ```rust
/// use rproxy_core::protocol::{decode_frame, InboundFrame};
/// use serde_json::json;
///
/// let frame = decode_frame(r#"{"id":-2,"result":"srv2"}"#).unwrap();
/// assert_eq!(
///     frame,
///     InboundFrame::Broadcast { channel_id: -2, payload: json!("srv2") }
/// );
/// ```
pub fn decode_frame(text: &str) -> Result<InboundFrame, ProtocolError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

    if raw.id == 0 {
        return Err(ProtocolError::ZeroId);
    }

    if raw.id < 0 {
        let payload = raw.result.ok_or(ProtocolError::MissingPayload { id: raw.id })?;
        return Ok(InboundFrame::Broadcast {
            channel_id: raw.id,
            payload,
        });
    }

    let id = RequestId::new(raw.id as u64).ok_or(ProtocolError::InvalidRequestId(raw.id))?;
    let outcome = match (raw.result, raw.error) {
        // A non-null error always wins: some servers send `"result": null`
        // alongside the error.
        (_, Some(error)) if !error.is_null() => Err(error),
        (Some(result), _) => Ok(result),
        (None, Some(_)) => Ok(Value::Null),
        (None, None) => return Err(ProtocolError::MissingPayload { id: raw.id }),
    };

    Ok(InboundFrame::Response { id, outcome })
}

// ── Server side ───────────────────────────────────────────────────────────────

/// Decodes a request frame as the server would see it.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is malformed or the id is not
/// positive.
pub fn decode_request(text: &str) -> Result<RequestFrame, ProtocolError> {
    let raw: RawRequest =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

    if raw.id == 0 {
        return Err(ProtocolError::ZeroId);
    }
    let id = u64::try_from(raw.id)
        .ok()
        .and_then(RequestId::new)
        .ok_or(ProtocolError::InvalidRequestId(raw.id))?;

    Ok(RequestFrame {
        id,
        method: raw.method,
        params: raw.params,
    })
}

/// Encodes a response envelope for request `id`.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_response(id: RequestId, outcome: &Result<Value, Value>) -> Result<String, ProtocolError> {
    let id = id.get() as i64;
    match outcome {
        Ok(result) => to_text(&OutboundResult { id, result }),
        Err(error) => to_text(&OutboundError { id, error }),
    }
}

/// Encodes a broadcast envelope on `channel`.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_broadcast(channel: BroadcastChannel, payload: &Value) -> Result<String, ProtocolError> {
    to_text(&OutboundResult {
        id: channel.id(),
        result: payload,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
