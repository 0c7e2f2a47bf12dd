//! Dispatcher: the connection state machine and inbound frame router.
//!
//! The dispatcher owns the [`CorrelationTable`] and the [`BroadcastRegistry`]
//! and decides, for every event on the connection, what happens to them.  It
//! does no I/O: outbound frames are *returned* as text for the caller to
//! write, and inbound frames are *passed in* as text.  This keeps every
//! ordering rule testable without a socket.
//!
//! # Routing
//!
//! ```text
//! inbound frame ── decode ──┬── id > 0 ──▶ CorrelationTable (resolve/reject)
//!                           └── id < 0 ──▶ BroadcastRegistry (deliver)
//! ```
//!
//! # State machine
//!
//! | State        | request                  | inbound frame | close            |
//! |--------------|--------------------------|---------------|------------------|
//! | `Connecting` | register + queue         | ignored       | reject all       |
//! | `Open`       | register + return frame  | routed        | reject all       |
//! | `Closed`     | fail `ConnectionClosed`  | ignored       | no-op            |
//!
//! # List snapshot
//!
//! The server pushes the full server list once, right after the handshake,
//! and only announces changes afterwards.  The dispatcher keeps the latest
//! list payload and hands it to every `List` registration made after it
//! arrived, so a caller that subscribes once `open` has returned still sees
//! the current list.

use std::collections::VecDeque;

use rproxy_core::{decode_frame, encode_request, BroadcastChannel, InboundFrame, Method};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::correlation::{CorrelationTable, Reply};
use crate::application::error::RpcError;
use crate::application::registry::{BroadcastRegistry, EventSink, OnceReply, SubscriptionId};
use crate::domain::ConnectionState;

/// Why the connection reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The handshake never completed.
    HandshakeFailed(String),
    /// An open connection ended (close frame, stream end, read/write error,
    /// or an explicit close by the client).
    Closed,
}

impl CloseReason {
    fn to_error(&self) -> RpcError {
        match self {
            CloseReason::HandshakeFailed(reason) => RpcError::ConnectionFailed(reason.clone()),
            CloseReason::Closed => RpcError::ConnectionClosed,
        }
    }
}

/// Connection state machine.  Owned by exactly one task.
#[derive(Debug, Default)]
pub struct Dispatcher {
    state: ConnectionState,
    table: CorrelationTable,
    registry: BroadcastRegistry,
    /// Encoded requests made while `Connecting`, in call order.
    queued: VecDeque<String>,
    /// Latest payload seen on the `List` channel.
    snapshot: Option<Value>,
}

impl Dispatcher {
    /// Creates a dispatcher in the `Connecting` state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of requests awaiting a response (queued ones included).
    pub fn pending(&self) -> usize {
        self.table.len()
    }

    /// `Connecting → Open`.  Returns the queued frames in call order.
    ///
    /// Has no effect in any other state.
    pub fn on_open(&mut self) -> Vec<String> {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "open event ignored");
            return Vec::new();
        }
        self.state = ConnectionState::Open;
        info!(queued = self.queued.len(), "connection open");
        self.queued.drain(..).collect()
    }

    /// Registers a request.
    ///
    /// Returns the encoded frame when it should be written now.  While
    /// connecting the frame is queued instead; once closed `reply` is failed
    /// immediately.
    pub fn on_request(&mut self, method: Method, params: Value, reply: Reply) -> Option<String> {
        if self.state.is_closed() {
            let _ = reply.send(Err(RpcError::ConnectionClosed));
            return None;
        }

        let id = self.table.register(reply);
        let text = match encode_request(id, method, &params) {
            Ok(text) => text,
            Err(e) => {
                warn!(%id, %method, "failed to encode request: {e}");
                self.table.reject(id, RpcError::Protocol(e));
                return None;
            }
        };
        debug!(%id, %method, "request registered");

        match self.state {
            ConnectionState::Connecting => {
                self.queued.push_back(text);
                None
            }
            _ => Some(text),
        }
    }

    /// Registers a one-shot wait on `channel`.
    pub fn on_once(&mut self, channel: BroadcastChannel, reply: OnceReply) {
        if self.state.is_closed() {
            let _ = reply.send(Err(RpcError::ConnectionClosed));
            return;
        }
        if let Some(snapshot) = self.snapshot_for(channel) {
            let _ = reply.send(Ok(snapshot));
            return;
        }
        self.registry.subscribe_once(channel, reply);
    }

    /// Registers a persistent subscription on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ConnectionClosed`] once the connection is closed.
    pub fn on_subscribe(
        &mut self,
        channel: BroadcastChannel,
        sink: EventSink,
    ) -> Result<SubscriptionId, RpcError> {
        if self.state.is_closed() {
            return Err(RpcError::ConnectionClosed);
        }
        if let Some(snapshot) = self.snapshot_for(channel) {
            let _ = sink.send(snapshot);
        }
        let id = self.registry.subscribe(channel, sink);
        debug!(%id, %channel, "subscribed");
        Ok(id)
    }

    fn snapshot_for(&self, channel: BroadcastChannel) -> Option<Value> {
        match channel {
            BroadcastChannel::List => self.snapshot.clone(),
            _ => None,
        }
    }

    /// Cancels a persistent subscription.  Idempotent.
    pub fn on_unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let removed = self.registry.unsubscribe(id);
        if removed {
            debug!(%id, "unsubscribed");
        }
        removed
    }

    /// Routes one inbound text frame.
    ///
    /// Malformed frames, unknown request ids and unknown channels are logged
    /// and dropped; none of them affects the connection.
    pub fn on_frame(&mut self, text: &str) {
        if self.state != ConnectionState::Open {
            debug!(state = %self.state, "inbound frame ignored");
            return;
        }

        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping malformed frame: {e}");
                return;
            }
        };

        match frame {
            InboundFrame::Response { id, outcome } => {
                self.table.complete(id, outcome);
            }
            InboundFrame::Broadcast { channel_id, payload } => {
                let Some(channel) = BroadcastChannel::from_id(channel_id) else {
                    debug!(channel_id, "broadcast on unknown channel dropped");
                    return;
                };
                let reached = self.registry.deliver(channel, &payload);
                if channel == BroadcastChannel::List {
                    self.snapshot = Some(payload);
                }
                debug!(%channel, reached, "broadcast delivered");
            }
        }
    }

    /// `* → Closed`.  Rejects every pending and queued request and drops all
    /// broadcast registrations.  Terminal: later calls are no-ops.
    pub fn on_close(&mut self, reason: CloseReason) {
        if self.state.is_closed() {
            return;
        }
        self.state = ConnectionState::Closed;
        self.queued.clear();
        self.snapshot = None;

        let error = reason.to_error();
        let rejected = self.table.reject_all(error.clone());
        self.registry.close(error);
        info!(?reason, rejected, "connection closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
