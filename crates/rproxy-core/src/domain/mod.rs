//! Domain payloads carried by the management protocol.
//!
//! Nothing here is interpreted by the router; these types only give the
//! typed client facade something concrete to decode results and events into.

pub mod server;

pub use server::{
    Command, CommandEntry, CommandError, CommandStatus, MatchData, NameId, Redirect,
    RedirectEntry, ServerListing, UserIds,
};
