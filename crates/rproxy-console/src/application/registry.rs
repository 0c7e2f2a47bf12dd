//! Broadcast registry: who is listening on which channel.
//!
//! Each broadcast channel holds an ordered list of registrations.  A one-shot
//! registration is a oneshot sender that is consumed by the first matching
//! frame.  A persistent registration is an unbounded mpsc sender that stays
//! until it is unsubscribed or its receiver goes away.  Delivering never
//! waits on a consumer: a slow subscriber just accumulates items in its own
//! queue.

use std::collections::HashMap;
use std::fmt;

use rproxy_core::BroadcastChannel;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::application::error::RpcError;

/// Continuation of a one-shot wait.
pub type OnceReply = oneshot::Sender<Result<Value, RpcError>>;

/// Continuation of a persistent subscription.
pub type EventSink = mpsc::UnboundedSender<Value>;

/// Handle used to cancel a persistent registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug)]
enum Sink {
    Once(OnceReply),
    Persistent(SubscriptionId, EventSink),
}

impl Sink {
    fn is_closed(&self) -> bool {
        match self {
            Sink::Once(reply) => reply.is_closed(),
            Sink::Persistent(_, sink) => sink.is_closed(),
        }
    }
}

/// Registrations per broadcast channel, in registration order.
#[derive(Debug, Default)]
pub struct BroadcastRegistry {
    next_id: u64,
    channels: HashMap<BroadcastChannel, Vec<Sink>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a one-shot wait, removed after its first delivery.
    pub fn subscribe_once(&mut self, channel: BroadcastChannel, reply: OnceReply) {
        self.live_sinks(channel).push(Sink::Once(reply));
    }

    /// Registers a persistent subscription.
    pub fn subscribe(&mut self, channel: BroadcastChannel, sink: EventSink) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.live_sinks(channel).push(Sink::Persistent(id, sink));
        id
    }

    /// Registrations on `channel`, with those whose receiver went away removed.
    fn live_sinks(&mut self, channel: BroadcastChannel) -> &mut Vec<Sink> {
        let sinks = self.channels.entry(channel).or_default();
        sinks.retain(|sink| !sink.is_closed());
        sinks
    }

    /// Removes a persistent subscription.
    ///
    /// Idempotent: returns `false` when `id` is not (or no longer) registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for sinks in self.channels.values_mut() {
            let before = sinks.len();
            sinks.retain(|sink| !matches!(sink, Sink::Persistent(sub, _) if *sub == id));
            if sinks.len() != before {
                return true;
            }
        }
        false
    }

    /// Delivers `payload` to every registration on `channel`.
    ///
    /// One-shot registrations are consumed; registrations whose receiver was
    /// dropped are pruned.  Returns the number of receivers reached.
    pub fn deliver(&mut self, channel: BroadcastChannel, payload: &Value) -> usize {
        let Some(sinks) = self.channels.get_mut(&channel) else {
            return 0;
        };

        let mut reached = 0;
        let mut kept = Vec::with_capacity(sinks.len());
        for sink in sinks.drain(..) {
            match sink {
                Sink::Once(reply) => {
                    if reply.send(Ok(payload.clone())).is_ok() {
                        reached += 1;
                    }
                }
                Sink::Persistent(id, events) => {
                    if events.send(payload.clone()).is_ok() {
                        reached += 1;
                        kept.push(Sink::Persistent(id, events));
                    } else {
                        debug!(%id, %channel, "subscriber gone; pruning registration");
                    }
                }
            }
        }
        *sinks = kept;
        reached
    }

    /// Drops every registration.
    ///
    /// One-shot waiters receive `error`; persistent subscribers observe the
    /// end of their stream.
    pub fn close(&mut self, error: RpcError) {
        for (_, sinks) in self.channels.drain() {
            for sink in sinks {
                if let Sink::Once(reply) = sink {
                    let _ = reply.send(Err(error.clone()));
                }
            }
        }
    }

    /// Number of live registrations on `channel`.
    pub fn len(&self, channel: BroadcastChannel) -> usize {
        self.channels
            .get(&channel)
            .map_or(0, |sinks| sinks.iter().filter(|sink| !sink.is_closed()).count())
    }

    pub fn is_empty(&self) -> bool {
        self.channels.values().all(Vec::is_empty)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
