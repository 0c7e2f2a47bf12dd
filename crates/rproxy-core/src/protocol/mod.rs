//! Protocol module containing envelope types, the JSON codec and the
//! method/channel tables.

pub mod channels;
pub mod codec;
pub mod envelope;
pub mod methods;
pub mod sequence;

pub use channels::{events, Broadcast, BroadcastChannel};
pub use codec::{decode_frame, decode_request, encode_broadcast, encode_request, encode_response};
pub use codec::ProtocolError;
pub use envelope::{InboundFrame, RequestFrame, RequestId};
pub use methods::{calls, Method, RpcMethod, UnknownMethod};
pub use sequence::SequenceCounter;
