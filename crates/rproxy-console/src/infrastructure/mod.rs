//! Infrastructure layer for rproxy-console.
//!
//! Handles all I/O: the WebSocket to the management server, the task that
//! drives the dispatcher from socket events and facade commands, and the
//! optional TOML config file.
//!
//! # What does NOT belong here?
//!
//! - Routing rules and pending-request bookkeeping (application layer)
//! - The typed method/channel tables (rproxy-core)

pub mod connection;
pub mod storage;
pub mod transport;

pub use storage::{load_config, ConfigError};
pub use transport::{ConnectionError, WsStream};
