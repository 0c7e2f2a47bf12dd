//! rproxy-console library crate.
//!
//! A multiplexing RPC client for the reverse-proxy management socket.  One
//! WebSocket carries any number of concurrent requests plus the server's
//! broadcast events; this crate hides the correlation and routing behind a
//! small async API.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! caller ── RpcClient (clone per task) ──┐
//!                                        │ commands (mpsc)
//!                              [connection task]
//!                                owns Dispatcher
//!                                 ├── CorrelationTable   id > 0
//!                                 └── BroadcastRegistry  id < 0
//!                                        │
//!                              WebSocket (tokio-tungstenite)
//!                                        │
//!                             rproxy management server
//! ```
//!
//! # Layer rules
//!
//! - `domain` holds plain configuration and state types (no I/O, no async).
//! - `application` holds the routing state machine.  It uses channel types
//!   from `tokio::sync` as continuations but never touches a socket.
//! - `infrastructure` does the I/O: the WebSocket transport, the connection
//!   task that drives the dispatcher, and config file loading.
//! - `client` is the public facade built on top of all three.
//!
//! # Example
//!
//! ```no_run
//! use rproxy_console::{ConsoleConfig, RpcClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = RpcClient::open(ConsoleConfig::default()).await?;
//! client.add("web").await?;
//! let ports = client.get_command_ports("web", 1).await?;
//! println!("listening on {ports:?}");
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration and connection state.
pub mod domain;

/// Application layer: correlation, broadcast routing, dispatcher.
pub mod application;

/// Infrastructure layer: WebSocket transport, connection task, config file.
pub mod infrastructure;

/// Public client facade.
pub mod client;

pub use application::RpcError;
pub use client::{RpcClient, RpcFuture, Subscription};
pub use domain::{ConnectionState, ConsoleConfig};
pub use infrastructure::ConnectionError;
