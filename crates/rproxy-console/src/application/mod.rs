//! Application layer for rproxy-console.
//!
//! Knows *what* happens to requests and broadcasts but not *how* frames
//! reach the socket.
//!
//! # Responsibilities
//!
//! - Allocating request ids and remembering who is waiting for each one
//! - Keeping one-shot and persistent broadcast registrations per channel
//! - The `Connecting → Open → Closed` state machine and frame routing
//! - The `RpcError` type callers see
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or reading frames (that is infrastructure)
//! - Spawning tasks (the connection task in infrastructure drives the
//!   dispatcher)

pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use correlation::{CorrelationTable, Reply};
pub use dispatcher::{CloseReason, Dispatcher};
pub use error::RpcError;
pub use registry::{BroadcastRegistry, EventSink, OnceReply, SubscriptionId};
