//! Broadcast channel table.
//!
//! The server pushes an event to every other connected console whenever the
//! configuration changes.  Each event kind has a fixed negative id; the list
//! below is the single place where ids, names and payload types are defined.
//!
//! Two views are generated from the table:
//!
//! - [`BroadcastChannel`], a plain enum used by the router, and
//! - one marker type per channel in [`events`], implementing [`Broadcast`],
//!   so typed subscriptions can be written as `client.subscribe::<events::Add>()`.

use std::fmt;

use serde::de::DeserializeOwned;

use crate::domain::server::{self, Command, NameId, Redirect, ServerListing};

/// A compile-time mapping from a marker type to a broadcast channel and the
/// shape of its payload.
pub trait Broadcast {
    /// Channel the event arrives on.
    const CHANNEL: BroadcastChannel;

    /// Payload carried by each event on this channel.
    type Payload: DeserializeOwned + Send + 'static;
}

macro_rules! broadcast_channels {
    ($( $(#[$doc:meta])* $variant:ident = $id:expr, $name:literal => $payload:ty; )+) => {
        /// Every broadcast channel the management server can push on.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum BroadcastChannel {
            $( $(#[$doc])* $variant, )+
        }

        impl BroadcastChannel {
            /// All channels, in id order (`-1`, `-2`, ...).
            pub const ALL: &'static [BroadcastChannel] = &[ $( BroadcastChannel::$variant, )+ ];

            /// The fixed negative wire id of this channel.
            pub const fn id(self) -> i64 {
                match self {
                    $( BroadcastChannel::$variant => $id, )+
                }
            }

            /// Short stable name, used in logs and by the CLI.
            pub const fn name(self) -> &'static str {
                match self {
                    $( BroadcastChannel::$variant => $name, )+
                }
            }
        }

        /// Marker types, one per broadcast channel.
        pub mod events {
            use super::*;

            $(
                $(#[$doc])*
                #[derive(Debug, Clone, Copy, PartialEq, Eq)]
                pub struct $variant;

                impl Broadcast for $variant {
                    const CHANNEL: BroadcastChannel = BroadcastChannel::$variant;
                    type Payload = $payload;
                }
            )+
        }
    };
}

broadcast_channels! {
    /// Full snapshot of every server, sent once right after connecting.
    List = -1, "list" => Vec<ServerListing>;
    /// A server was created.  Payload: the new name.
    Add = -2, "add" => String;
    /// A server was renamed.  Payload: `[old, new]`.
    Rename = -3, "rename" => (String, String);
    /// A server was removed.  Payload: its name.
    Remove = -4, "remove" => String;
    /// A redirect was added to a server.
    AddRedirect = -5, "add-redirect" => Redirect;
    /// A command was added to a server.
    AddCommand = -6, "add-command" => Command;
    /// A redirect's settings changed.
    ModifyRedirect = -7, "modify-redirect" => Redirect;
    /// A command's settings changed.
    ModifyCommand = -8, "modify-command" => Command;
    /// A redirect was removed.
    RemoveRedirect = -9, "remove-redirect" => NameId;
    /// A command was removed.
    RemoveCommand = -10, "remove-command" => NameId;
    /// A redirect was started.
    StartRedirect = -11, "start-redirect" => NameId;
    /// A command was started.
    StartCommand = -12, "start-command" => NameId;
    /// A redirect was stopped.
    StopRedirect = -13, "stop-redirect" => NameId;
    /// A command was stopped by an operator.
    StopCommand = -14, "stop-command" => NameId;
    /// A command exited on its own.  Payload: `[server, id]`.
    CommandStopped = -15, "command-stopped" => (String, u64);
    /// A command failed to start or crashed.
    CommandError = -16, "command-error" => server::CommandError;
}

impl BroadcastChannel {
    /// Looks up the channel for a wire id.  Returns `None` for ids that are
    /// not part of the table (including every non-negative id).
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|channel| channel.id() == id)
    }
}

impl fmt::Display for BroadcastChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_channel_ids_are_contiguous_negatives() {
        // Arrange / Act
        let ids: Vec<i64> = BroadcastChannel::ALL.iter().map(|c| c.id()).collect();

        // Assert – -1 through -16, in order, no gaps
        let expected: Vec<i64> = (1..=16).map(|n: i64| -n).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_channel_names_are_unique() {
        let names: HashSet<&str> = BroadcastChannel::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), BroadcastChannel::ALL.len());
    }

    #[test]
    fn test_from_id_finds_every_channel() {
        for &channel in BroadcastChannel::ALL {
            assert_eq!(BroadcastChannel::from_id(channel.id()), Some(channel));
        }
    }

    #[test]
    fn test_from_id_rejects_unknown_and_positive_ids() {
        assert_eq!(BroadcastChannel::from_id(-17), None);
        assert_eq!(BroadcastChannel::from_id(0), None);
        assert_eq!(BroadcastChannel::from_id(1), None);
    }

    #[test]
    fn test_marker_types_point_at_their_channel() {
        assert_eq!(<events::List as Broadcast>::CHANNEL.id(), -1);
        assert_eq!(<events::AddRedirect as Broadcast>::CHANNEL.id(), -5);
        assert_eq!(<events::CommandError as Broadcast>::CHANNEL.id(), -16);
    }

    #[test]
    fn test_display_includes_name_and_id() {
        assert_eq!(BroadcastChannel::StopRedirect.to_string(), "stop-redirect (-13)");
    }
}
