//! Request method table.
//!
//! Like the broadcast table, this is the one place where method names and
//! their parameter/result shapes are written down.  The macro turns it into
//! a closed [`Method`] enum (what goes on the wire) and one marker type per
//! method in [`calls`] (what typed callers use), so a misspelt method name or
//! a wrongly shaped parameter is a compile error rather than a runtime one.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::domain::server::{Command, NameId, Redirect};

/// A compile-time mapping from a marker type to a request method and its
/// parameter and result shapes.
pub trait RpcMethod {
    /// Wire method name.
    const METHOD: Method;

    /// Parameters sent with the request.
    type Params: Serialize;

    /// Shape of a successful result.
    type Output: DeserializeOwned + Send + 'static;
}

/// Returned when parsing a method name that is not in the table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown method: {0}")]
pub struct UnknownMethod(pub String);

macro_rules! rpc_methods {
    ($( $(#[$doc:meta])* $variant:ident = $name:literal, $params:ty => $output:ty; )+) => {
        /// Every request method the management server understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Method {
            $( $(#[$doc])* $variant, )+
        }

        impl Method {
            /// All methods, in table order.
            pub const ALL: &'static [Method] = &[ $( Method::$variant, )+ ];

            /// The wire name, e.g. `"addRedirect"`.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Method::$variant => $name, )+
                }
            }
        }

        /// Marker types, one per request method.
        pub mod calls {
            use super::*;

            $(
                $(#[$doc])*
                #[derive(Debug, Clone, Copy, PartialEq, Eq)]
                pub struct $variant;

                impl RpcMethod for $variant {
                    const METHOD: Method = Method::$variant;
                    type Params = $params;
                    type Output = $output;
                }
            )+
        }
    };
}

rpc_methods! {
    /// Create a server.  Older servers answer `null`, newer ones an id.
    Add = "add", String => Option<u64>;
    /// Rename a server: `[old, new]`.
    Rename = "rename", (String, String) => ();
    /// Remove a server with nothing running.
    Remove = "remove", String => ();
    /// Add a redirect; answers the new redirect id.
    AddRedirect = "addRedirect", Redirect => u64;
    /// Add a command; answers the new command id.
    AddCommand = "addCommand", Command => u64;
    /// Replace a stopped redirect's settings.
    ModifyRedirect = "modifyRedirect", Redirect => ();
    /// Replace a stopped command's settings.
    ModifyCommand = "modifyCommand", Command => ();
    /// Delete a stopped redirect.
    RemoveRedirect = "removeRedirect", NameId => ();
    /// Delete a stopped command.
    RemoveCommand = "removeCommand", NameId => ();
    /// Start a redirect.
    StartRedirect = "startRedirect", NameId => ();
    /// Start a command.
    StartCommand = "startCommand", NameId => ();
    /// Stop a running redirect.
    StopRedirect = "stopRedirect", NameId => ();
    /// Stop a running command.
    StopCommand = "stopCommand", NameId => ();
    /// Ports a running command is currently listening on.
    GetCommandPorts = "getCommandPorts", NameId => Vec<u16>;
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}
