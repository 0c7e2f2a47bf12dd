//! Domain layer for rproxy-console.
//!
//! Plain data types with no dependencies on I/O or the async runtime: the
//! console configuration and the connection state machine's states.

pub mod config;
pub mod state;

pub use config::ConsoleConfig;
pub use state::ConnectionState;
