//! # rproxy-core
//!
//! Shared protocol definitions for the reverse-proxy management socket.
//!
//! The management server exposes a single WebSocket endpoint (`/socket`).
//! Over it, the client issues JSON-RPC style requests and the server pushes
//! broadcast events whenever another operator changes something.  This crate
//! describes *what travels on the wire*; it performs no I/O and knows nothing
//! about sockets or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! Every frame on the socket is a small JSON object with an integer `id`:
//!
//! - **positive ids** belong to requests.  The client picks a fresh id for
//!   every call and the server echoes it on the matching response, so many
//!   calls can be in flight at once on the same socket.
//! - **negative ids** are broadcast channels.  Each kind of server-side event
//!   (server added, redirect started, command crashed, ...) has one fixed
//!   negative id that both ends know at compile time.
//!
//! The crate is split into:
//!
//! - **`protocol`** – the envelope types, the JSON codec, the request id
//!   counter, and the closed tables of request methods and broadcast
//!   channels.
//!
//! - **`domain`** – the payload shapes (servers, redirects, commands) that the
//!   method and channel tables refer to.  The protocol layer never looks
//!   inside them; only the typed client facade does.

pub mod domain;
pub mod protocol;

pub use domain::server::{
    Command, CommandEntry, CommandError, CommandStatus, MatchData, NameId, Redirect,
    RedirectEntry, ServerListing, UserIds,
};
pub use protocol::channels::{Broadcast, BroadcastChannel};
pub use protocol::codec::{decode_frame, encode_request, ProtocolError};
pub use protocol::envelope::{InboundFrame, RequestId};
pub use protocol::methods::{Method, RpcMethod};
pub use protocol::sequence::SequenceCounter;
