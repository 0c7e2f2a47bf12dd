//! Correlation table: in-flight requests keyed by request id.
//!
//! Every request gets a fresh id from the [`SequenceCounter`] and a oneshot
//! sender that will receive exactly one outcome.  When the matching response
//! arrives the entry is removed and the sender fired; when the connection
//! closes every remaining sender is fired with the closure error.

use std::collections::HashMap;

use rproxy_core::{RequestId, SequenceCounter};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::application::error::RpcError;

/// Continuation of one pending request.
pub type Reply = oneshot::Sender<Result<Value, RpcError>>;

/// Pending requests awaiting a response.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    counter: SequenceCounter,
    pending: HashMap<RequestId, Reply>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next free id and stores `reply` under it.
    ///
    /// Ids increase by one per call, wrap from `i64::MAX` to `1`, and skip
    /// any id that is still pending.
    pub fn register(&mut self, reply: Reply) -> RequestId {
        let pending = &self.pending;
        let id = self.counter.next_unused(|candidate| pending.contains_key(&candidate));
        self.pending.insert(id, reply);
        id
    }

    /// Completes request `id` with the server's outcome.
    ///
    /// An `Err` outcome becomes [`RpcError::Application`].  Returns `false`
    /// for an unknown id (duplicate or stale response), which is ignored.
    pub fn complete(&mut self, id: RequestId, outcome: Result<Value, Value>) -> bool {
        match outcome {
            Ok(result) => self.resolve(id, result),
            Err(error) => self.reject(id, RpcError::Application(error)),
        }
    }

    /// Resolves request `id` with `value`.
    pub fn resolve(&mut self, id: RequestId, value: Value) -> bool {
        self.fire(id, Ok(value))
    }

    /// Rejects request `id` with `error`.
    pub fn reject(&mut self, id: RequestId, error: RpcError) -> bool {
        self.fire(id, Err(error))
    }

    /// Rejects every pending request with `error`.  Returns how many there were.
    pub fn reject_all(&mut self, error: RpcError) -> usize {
        let count = self.pending.len();
        for (_, reply) in self.pending.drain() {
            // The caller may have given up on the request; nothing to do then.
            let _ = reply.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn fire(&mut self, id: RequestId, outcome: Result<Value, RpcError>) -> bool {
        match self.pending.remove(&id) {
            Some(reply) => {
                if reply.send(outcome).is_err() {
                    debug!(%id, "caller dropped before response arrived");
                }
                true
            }
            None => {
                debug!(%id, "response for unknown request id ignored");
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
