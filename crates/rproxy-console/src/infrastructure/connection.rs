//! The connection task.
//!
//! One Tokio task per client connection owns the [`Dispatcher`] and the
//! WebSocket.  Facade calls reach it as [`Command`]s over an unbounded mpsc
//! queue; inbound frames arrive on the WebSocket stream.  `tokio::select!`
//! serializes both sources, so exactly one dispatcher transition runs at a
//! time and the tables need no locks.
//!
//! ```text
//! RpcClient ──Command──▶ ┌───────────────────┐ ──text──▶ WebSocket sink
//! RpcClient ──Command──▶ │  connection task  │
//! Subscription ─unsub──▶ │  (Dispatcher)     │ ◀──text── WebSocket stream
//!                        └───────────────────┘
//!                                 │ ConnectionState (watch)
//!                                 ▼
//!                             RpcClient::state / closed
//! ```

use futures_util::{SinkExt, StreamExt};
use rproxy_core::{BroadcastChannel, Method};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::application::{CloseReason, Dispatcher, EventSink, OnceReply, Reply, RpcError, SubscriptionId};
use crate::domain::{ConnectionState, ConsoleConfig};
use crate::infrastructure::transport::{self, WsStream};

/// A request from the facade to the connection task.
#[derive(Debug)]
pub enum Command {
    Request {
        method: Method,
        params: Value,
        reply: Reply,
    },
    Once {
        channel: BroadcastChannel,
        reply: OnceReply,
    },
    Subscribe {
        channel: BroadcastChannel,
        sink: EventSink,
        ack: oneshot::Sender<Result<SubscriptionId, RpcError>>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    /// Graceful close: send a close frame and tear down.
    Close,
}

/// How the task obtains its socket.
pub enum Start {
    /// The handshake already completed (`RpcClient::open`).
    Connected(WsStream),
    /// Dial from inside the task, queueing requests until the handshake
    /// completes (`RpcClient::spawn`).
    Dial(ConsoleConfig),
}

/// Applies a command to the dispatcher.  Returns a frame to write, if any.
fn apply(dispatcher: &mut Dispatcher, command: Command) -> Option<String> {
    match command {
        Command::Request {
            method,
            params,
            reply,
        } => dispatcher.on_request(method, params, reply),
        Command::Once { channel, reply } => {
            dispatcher.on_once(channel, reply);
            None
        }
        Command::Subscribe { channel, sink, ack } => {
            let _ = ack.send(dispatcher.on_subscribe(channel, sink));
            None
        }
        Command::Unsubscribe { id } => {
            dispatcher.on_unsubscribe(id);
            None
        }
        Command::Close => None,
    }
}

/// Runs one connection to completion.
///
/// Returns after the connection reaches `Closed` and every command that was
/// already queued has been answered.
pub async fn run(
    start: Start,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
) {
    let mut dispatcher = Dispatcher::new();

    let ws = match start {
        Start::Connected(ws) => ws,
        Start::Dial(config) => match dial(&config, &mut dispatcher, &mut commands).await {
            Some(ws) => ws,
            None => {
                finish(dispatcher, commands, &state).await;
                return;
            }
        },
    };

    let (mut sink, mut stream) = ws.split();

    let backlog = dispatcher.on_open();
    state.send_replace(ConnectionState::Open);
    for text in backlog {
        if let Err(e) = sink.send(Message::Text(text)).await {
            warn!("failed to flush queued request: {e}");
            dispatcher.on_close(CloseReason::Closed);
            finish(dispatcher, commands, &state).await;
            return;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => {
                let command = match command {
                    Some(Command::Close) => {
                        info!("close requested");
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                    Some(command) => command,
                    None => {
                        debug!("every client handle dropped; closing");
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                };
                if let Some(text) = apply(&mut dispatcher, command) {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!("write to management socket failed: {e}");
                        break;
                    }
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        debug!(len = text.len(), "frame received");
                        dispatcher.on_frame(&text);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "binary frame ignored");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed the connection");
                        break;
                    }
                    // Ping/pong are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("read from management socket failed: {e}");
                        break;
                    }
                    None => {
                        info!("management socket stream ended");
                        break;
                    }
                }
            }
        }
    }

    dispatcher.on_close(CloseReason::Closed);
    finish(dispatcher, commands, &state).await;
}

/// Dials the server while still accepting commands, which the dispatcher
/// queues until the handshake completes.
///
/// Returns `None` when the handshake failed or the client closed first; the
/// dispatcher is already `Closed` in that case.
async fn dial(
    config: &ConsoleConfig,
    dispatcher: &mut Dispatcher,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Option<WsStream> {
    let handshake = transport::open(config);
    tokio::pin!(handshake);

    loop {
        tokio::select! {
            result = &mut handshake => {
                return match result {
                    Ok(ws) => Some(ws),
                    Err(e) => {
                        warn!("handshake failed: {e}");
                        dispatcher.on_close(CloseReason::HandshakeFailed(e.to_string()));
                        None
                    }
                };
            }
            command = commands.recv() => match command {
                Some(Command::Close) | None => {
                    info!("closed before the handshake completed");
                    dispatcher.on_close(CloseReason::Closed);
                    return None;
                }
                Some(command) => {
                    // Nothing is written while connecting.
                    let _ = apply(dispatcher, command);
                }
            },
        }
    }
}

/// Publishes `Closed` and answers every command still in the queue.
async fn finish(
    mut dispatcher: Dispatcher,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: &watch::Sender<ConnectionState>,
) {
    state.send_replace(ConnectionState::Closed);
    commands.close();
    while let Some(command) = commands.recv().await {
        let _ = apply(&mut dispatcher, command);
    }
}
