//! Envelope types: the `{id, payload}` pairs that travel over the socket.
//!
//! ```text
//! client → server   {"id": 7,  "method": "add", "params": "srv1"}
//! server → client   {"id": 7,  "result": 3}
//! server → client   {"id": 7,  "error": "name already exists"}
//! server → client   {"id": -2, "result": "srv2"}          (broadcast)
//! ```
//!
//! The id is the only field the protocol layer ever interprets.  Results,
//! errors and broadcast payloads are carried as opaque [`serde_json::Value`]s.

use std::fmt;

use serde_json::Value;

/// Correlation id of one request/response pair.
///
/// Always in `1..=i64::MAX`: zero is reserved and the upper bound keeps the
/// id representable in the signed id field shared with broadcast channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// The first id handed out on a fresh connection.
    pub const FIRST: RequestId = RequestId(1);

    /// The largest id the wire format can carry.
    pub const MAX: RequestId = RequestId(i64::MAX as u64);

    /// Creates a request id, returning `None` for `0` or values above
    /// [`RequestId::MAX`].
    pub fn new(value: u64) -> Option<Self> {
        if value == 0 || value > Self::MAX.0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the raw integer value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one, wrapping from
    /// [`RequestId::MAX`] back to [`RequestId::FIRST`].
    pub fn successor(self) -> Self {
        if self.0 >= Self::MAX.0 {
            Self::FIRST
        } else {
            Self(self.0 + 1)
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded frame received by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Reply to an earlier request.
    ///
    /// `outcome` is `Ok(result)` on success and `Err(error)` when the server
    /// reported an application-level failure.  Both sides are passed through
    /// to the caller untouched.
    Response {
        id: RequestId,
        outcome: Result<Value, Value>,
    },

    /// Server-initiated push on a (negative) broadcast channel id.
    ///
    /// The channel id is kept raw: a newer server may use channels this
    /// client does not know about, and those are dropped by the router, not
    /// rejected by the codec.
    Broadcast { channel_id: i64, payload: Value },
}

/// A decoded request as seen by the server end of the socket.
///
/// The console never receives these; they exist so the protocol can be
/// exercised end to end (tests, benchmarks, scripted mock servers).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
