//! Client facade.
//!
//! [`RpcClient`] is a cheap, cloneable handle onto one connection task.
//! Every call is turned into a command for that task *at call time*, so the
//! order in which calls are made is the order in which requests hit the wire,
//! even when the returned futures are awaited in a different order.
//!
//! Three families of calls exist:
//!
//! - **requests**: [`RpcClient::request`] (typed via a marker from
//!   [`rproxy_core::protocol::calls`]) and one wrapper per method, e.g.
//!   [`RpcClient::start_redirect`].
//! - **one-shot waits**: [`RpcClient::once`] resolves with the next event on a
//!   broadcast channel.
//! - **subscriptions**: [`RpcClient::subscribe`] and the `wait_*` wrappers
//!   return a [`Subscription`], a stream of every event on the channel until
//!   it is unsubscribed, dropped, or the connection closes.

use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::Stream;
use rproxy_core::protocol::{calls, events};
use rproxy_core::{
    Broadcast, BroadcastChannel, Command, CommandError, Method, NameId, ProtocolError, Redirect,
    RpcMethod, ServerListing,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::application::{RpcError, SubscriptionId};
use crate::domain::{ConnectionState, ConsoleConfig};
use crate::infrastructure::connection::{self, Start};
use crate::infrastructure::transport;
use crate::infrastructure::ConnectionError;

/// Future returned by every facade call.
pub type RpcFuture<T> = BoxFuture<'static, Result<T, RpcError>>;

fn decode_payload<T: DeserializeOwned>(value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
}

/// Handle onto one management connection.
#[derive(Debug, Clone)]
pub struct RpcClient {
    commands: mpsc::UnboundedSender<connection::Command>,
    state: watch::Receiver<ConnectionState>,
    connection_id: Uuid,
}

impl RpcClient {
    /// Opens a connection and resolves once the handshake has completed.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the socket cannot be opened.
    pub async fn open(config: ConsoleConfig) -> Result<Self, ConnectionError> {
        let connection_id = Uuid::new_v4();
        let span = info_span!("connection", id = %connection_id);
        let ws = transport::open(&config).instrument(span.clone()).await?;
        Ok(Self::start(Start::Connected(ws), connection_id, span))
    }

    /// Starts connecting in the background and returns immediately.
    ///
    /// Calls made before the handshake completes are queued and written in
    /// call order once it does.  If the handshake fails they are rejected
    /// with [`RpcError::ConnectionFailed`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: ConsoleConfig) -> Self {
        let connection_id = Uuid::new_v4();
        let span = info_span!("connection", id = %connection_id);
        Self::start(Start::Dial(config), connection_id, span)
    }

    fn start(start: Start, connection_id: Uuid, span: tracing::Span) -> Self {
        let initial = match start {
            Start::Connected(_) => ConnectionState::Open,
            Start::Dial(_) => ConnectionState::Connecting,
        };
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(initial);
        tokio::spawn(connection::run(start, command_rx, state_tx).instrument(span));
        Self {
            commands,
            state,
            connection_id,
        }
    }

    /// Identifier attached to this connection's log lines.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the handshake has completed.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ConnectionClosed`] if the connection closed
    /// (or failed to open) instead.
    pub async fn wait_open(&self) -> Result<(), RpcError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s != ConnectionState::Connecting)
            .await
            .map(|s| *s);
        match reached {
            Ok(ConnectionState::Open) => Ok(()),
            _ => Err(RpcError::ConnectionClosed),
        }
    }

    /// Resolves once the connection has reached `Closed`.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| s.is_closed()).await;
    }

    /// Closes the connection gracefully and waits until it is closed.
    ///
    /// Pending requests are rejected with [`RpcError::ConnectionClosed`].
    pub async fn close(&self) {
        let _ = self.commands.send(connection::Command::Close);
        self.closed().await;
    }

    // ── Generic calls ─────────────────────────────────────────────────────────

    /// Sends `method` with untyped `params` and resolves with the raw result.
    pub fn request_raw(&self, method: Method, params: Value) -> RpcFuture<Value> {
        let (reply, response) = oneshot::channel();
        let sent = self
            .commands
            .send(connection::Command::Request {
                method,
                params,
                reply,
            })
            .is_ok();
        async move {
            if !sent {
                return Err(RpcError::ConnectionClosed);
            }
            response.await.unwrap_or(Err(RpcError::ConnectionClosed))
        }
        .boxed()
    }

    /// Sends the request described by marker `M` and decodes its result.
    ///
    /// ```no_run
    /// use rproxy_console::{ConsoleConfig, RpcClient};
    /// use rproxy_core::protocol::calls;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = RpcClient::open(ConsoleConfig::default()).await?;
    /// client.request::<calls::Rename>(("old".into(), "new".into())).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn request<M>(&self, params: M::Params) -> RpcFuture<M::Output>
    where
        M: RpcMethod + 'static,
    {
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                let error = RpcError::Protocol(ProtocolError::Encode(e.to_string()));
                return future::ready(Err(error)).boxed();
            }
        };
        let response = self.request_raw(M::METHOD, params);
        async move { decode_payload(response.await?) }.boxed()
    }

    /// Resolves with the next event on `channel`.
    pub fn once_raw(&self, channel: BroadcastChannel) -> RpcFuture<Value> {
        let (reply, event) = oneshot::channel();
        let sent = self
            .commands
            .send(connection::Command::Once { channel, reply })
            .is_ok();
        async move {
            if !sent {
                return Err(RpcError::ConnectionClosed);
            }
            event.await.unwrap_or(Err(RpcError::ConnectionClosed))
        }
        .boxed()
    }

    /// Resolves with the next event on broadcast `B`, decoded.
    pub fn once<B>(&self) -> RpcFuture<B::Payload>
    where
        B: Broadcast + 'static,
    {
        let event = self.once_raw(B::CHANNEL);
        async move { decode_payload(event.await?) }.boxed()
    }

    /// Subscribes to every event on `channel`, undecoded.
    pub fn subscribe_raw(&self, channel: BroadcastChannel) -> RpcFuture<Subscription<Value>> {
        self.subscribe_channel(channel)
    }

    /// Subscribes to every event on broadcast `B`.
    pub fn subscribe<B>(&self) -> RpcFuture<Subscription<B::Payload>>
    where
        B: Broadcast + 'static,
    {
        self.subscribe_channel(B::CHANNEL)
    }

    fn subscribe_channel<T>(&self, channel: BroadcastChannel) -> RpcFuture<Subscription<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (sink, events) = mpsc::unbounded_channel();
        let (ack, registered) = oneshot::channel();
        let sent = self
            .commands
            .send(connection::Command::Subscribe { channel, sink, ack })
            .is_ok();
        let commands = self.commands.clone();
        async move {
            if !sent {
                return Err(RpcError::ConnectionClosed);
            }
            let id = registered.await.unwrap_or(Err(RpcError::ConnectionClosed))?;
            Ok(Subscription::new(id, channel, events, commands))
        }
        .boxed()
    }

    // ── Methods ───────────────────────────────────────────────────────────────

    /// Creates a server.  Newer servers answer with its id.
    pub fn add(&self, name: impl Into<String>) -> RpcFuture<Option<u64>> {
        self.request::<calls::Add>(name.into())
    }

    pub fn rename(&self, old: impl Into<String>, new: impl Into<String>) -> RpcFuture<()> {
        self.request::<calls::Rename>((old.into(), new.into()))
    }

    /// Removes a server.  The server refuses while anything on it is running.
    pub fn remove(&self, name: impl Into<String>) -> RpcFuture<()> {
        self.request::<calls::Remove>(name.into())
    }

    /// Adds a redirect and resolves with its id.
    pub fn add_redirect(&self, redirect: Redirect) -> RpcFuture<u64> {
        self.request::<calls::AddRedirect>(redirect)
    }

    /// Adds a command and resolves with its id.
    pub fn add_command(&self, command: Command) -> RpcFuture<u64> {
        self.request::<calls::AddCommand>(command)
    }

    pub fn modify_redirect(&self, redirect: Redirect) -> RpcFuture<()> {
        self.request::<calls::ModifyRedirect>(redirect)
    }

    pub fn modify_command(&self, command: Command) -> RpcFuture<()> {
        self.request::<calls::ModifyCommand>(command)
    }

    pub fn remove_redirect(&self, server: impl Into<String>, id: u64) -> RpcFuture<()> {
        self.request::<calls::RemoveRedirect>(NameId::new(server, id))
    }

    pub fn remove_command(&self, server: impl Into<String>, id: u64) -> RpcFuture<()> {
        self.request::<calls::RemoveCommand>(NameId::new(server, id))
    }

    pub fn start_redirect(&self, server: impl Into<String>, id: u64) -> RpcFuture<()> {
        self.request::<calls::StartRedirect>(NameId::new(server, id))
    }

    pub fn start_command(&self, server: impl Into<String>, id: u64) -> RpcFuture<()> {
        self.request::<calls::StartCommand>(NameId::new(server, id))
    }

    pub fn stop_redirect(&self, server: impl Into<String>, id: u64) -> RpcFuture<()> {
        self.request::<calls::StopRedirect>(NameId::new(server, id))
    }

    pub fn stop_command(&self, server: impl Into<String>, id: u64) -> RpcFuture<()> {
        self.request::<calls::StopCommand>(NameId::new(server, id))
    }

    /// Ports a running command is listening on.
    pub fn get_command_ports(&self, server: impl Into<String>, id: u64) -> RpcFuture<Vec<u16>> {
        self.request::<calls::GetCommandPorts>(NameId::new(server, id))
    }

    // ── Broadcast streams ─────────────────────────────────────────────────────

    /// Full server list.  The server pushes one right after the handshake;
    /// a subscription made after it arrived starts with that snapshot.
    pub fn wait_list(&self) -> RpcFuture<Subscription<Vec<ServerListing>>> {
        self.subscribe::<events::List>()
    }

    /// Names of servers added by anyone.
    pub fn wait_add(&self) -> RpcFuture<Subscription<String>> {
        self.subscribe::<events::Add>()
    }

    /// `(old, new)` server names.
    pub fn wait_rename(&self) -> RpcFuture<Subscription<(String, String)>> {
        self.subscribe::<events::Rename>()
    }

    pub fn wait_remove(&self) -> RpcFuture<Subscription<String>> {
        self.subscribe::<events::Remove>()
    }

    pub fn wait_add_redirect(&self) -> RpcFuture<Subscription<Redirect>> {
        self.subscribe::<events::AddRedirect>()
    }

    pub fn wait_add_command(&self) -> RpcFuture<Subscription<Command>> {
        self.subscribe::<events::AddCommand>()
    }

    pub fn wait_modify_redirect(&self) -> RpcFuture<Subscription<Redirect>> {
        self.subscribe::<events::ModifyRedirect>()
    }

    pub fn wait_modify_command(&self) -> RpcFuture<Subscription<Command>> {
        self.subscribe::<events::ModifyCommand>()
    }

    pub fn wait_remove_redirect(&self) -> RpcFuture<Subscription<NameId>> {
        self.subscribe::<events::RemoveRedirect>()
    }

    pub fn wait_remove_command(&self) -> RpcFuture<Subscription<NameId>> {
        self.subscribe::<events::RemoveCommand>()
    }

    pub fn wait_start_redirect(&self) -> RpcFuture<Subscription<NameId>> {
        self.subscribe::<events::StartRedirect>()
    }

    pub fn wait_start_command(&self) -> RpcFuture<Subscription<NameId>> {
        self.subscribe::<events::StartCommand>()
    }

    pub fn wait_stop_redirect(&self) -> RpcFuture<Subscription<NameId>> {
        self.subscribe::<events::StopRedirect>()
    }

    pub fn wait_stop_command(&self) -> RpcFuture<Subscription<NameId>> {
        self.subscribe::<events::StopCommand>()
    }

    /// `(server, id)` of commands that exited on their own.
    pub fn wait_command_stopped(&self) -> RpcFuture<Subscription<(String, u64)>> {
        self.subscribe::<events::CommandStopped>()
    }

    /// Commands that failed to start or exited with an error.
    pub fn wait_command_error(&self) -> RpcFuture<Subscription<CommandError>> {
        self.subscribe::<events::CommandError>()
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// Stream of events on one broadcast channel.
///
/// Yields `Err(RpcError::Decode)` for an event whose payload does not have
/// the expected shape; the stream continues afterwards.  The stream ends
/// when the connection closes or after [`Subscription::unsubscribe`] once any
/// already-delivered events have been read.  Dropping the subscription
/// unsubscribes it.
pub struct Subscription<T> {
    id: SubscriptionId,
    channel: BroadcastChannel,
    events: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<connection::Command>,
    active: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Subscription<T> {
    fn new(
        id: SubscriptionId,
        channel: BroadcastChannel,
        events: mpsc::UnboundedReceiver<Value>,
        commands: mpsc::UnboundedSender<connection::Command>,
    ) -> Self {
        Self {
            id,
            channel,
            events,
            commands,
            active: true,
            _payload: PhantomData,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> BroadcastChannel {
        self.channel
    }

    /// Stops further deliveries.  Returns `false` if already unsubscribed.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        // A closed connection has no registrations left to remove.
        let _ = self
            .commands
            .send(connection::Command::Unsubscribe { id: self.id });
        self.events.close();
        true
    }
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Waits for the next event.  `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<T, RpcError>> {
        self.events.recv().await.map(decode_payload)
    }
}

impl<T: DeserializeOwned> Stream for Subscription<T> {
    type Item = Result<T, RpcError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events
            .poll_recv(cx)
            .map(|event| event.map(decode_payload))
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.active)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::BroadcastRegistry;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    /// A subscription wired to a real registry, plus the command queue it
    /// reports to.
    fn registered<T>(
        channel: BroadcastChannel,
    ) -> (
        BroadcastRegistry,
        Subscription<T>,
        mpsc::UnboundedReceiver<connection::Command>,
    ) {
        let mut registry = BroadcastRegistry::new();
        let (sink, events) = mpsc::unbounded_channel();
        let id = registry.subscribe(channel, sink);
        let (commands, command_rx) = mpsc::unbounded_channel();
        (registry, Subscription::new(id, channel, events, commands), command_rx)
    }

    /// A client whose connection task has already gone away.
    fn detached_client() -> RpcClient {
        let (commands, command_rx) = mpsc::unbounded_channel();
        drop(command_rx);
        let (_state_tx, state) = watch::channel(ConnectionState::Closed);
        RpcClient {
            commands,
            state,
            connection_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_next_is_pending_until_an_event_arrives() {
        // Arrange
        let (mut registry, mut sub, _commands) = registered::<String>(BroadcastChannel::Add);
        let mut next = task::spawn(sub.next());
        assert_pending!(next.poll());

        // Act
        registry.deliver(BroadcastChannel::Add, &json!("srv1"));

        // Assert
        assert!(next.is_woken());
        let event = assert_ready!(next.poll());
        assert_eq!(event, Some(Ok("srv1".to_string())));
    }

    #[test]
    fn test_payload_of_wrong_shape_yields_decode_error_and_stream_continues() {
        let (mut registry, mut sub, _commands) = registered::<NameId>(BroadcastChannel::StartRedirect);
        registry.deliver(BroadcastChannel::StartRedirect, &json!("not a name id"));
        registry.deliver(BroadcastChannel::StartRedirect, &json!({"server": "a", "id": 1}));

        let mut first = task::spawn(sub.next());
        assert!(matches!(assert_ready!(first.poll()), Some(Err(RpcError::Decode(_)))));
        drop(first);

        let mut second = task::spawn(sub.next());
        assert_eq!(assert_ready!(second.poll()), Some(Ok(NameId::new("a", 1))));
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_sends_one_command() {
        let (_registry, mut sub, mut commands) = registered::<Value>(BroadcastChannel::Add);
        let id = sub.id();

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());

        assert!(matches!(
            commands.try_recv(),
            Ok(connection::Command::Unsubscribe { id: sent }) if sent == id
        ));
        assert!(commands.try_recv().is_err());
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let (_registry, sub, mut commands) = registered::<Value>(BroadcastChannel::List);
        drop(sub);
        assert!(matches!(
            commands.try_recv(),
            Ok(connection::Command::Unsubscribe { .. })
        ));
    }

    #[test]
    fn test_stream_ends_when_registry_closes() {
        let (mut registry, sub, _commands) = registered::<Value>(BroadcastChannel::Remove);
        let mut stream = task::spawn(sub);
        assert_pending!(stream.poll_next());

        registry.close(RpcError::ConnectionClosed);

        assert!(stream.is_woken());
        assert!(assert_ready!(stream.poll_next()).is_none());
    }

    #[tokio::test]
    async fn test_calls_on_detached_client_fail_with_connection_closed() {
        let client = detached_client();

        assert_eq!(client.add("x").await, Err(RpcError::ConnectionClosed));
        assert_eq!(
            client.once::<events::List>().await.map(|_| ()),
            Err(RpcError::ConnectionClosed)
        );
        assert!(matches!(
            client.wait_add().await,
            Err(RpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_wait_open_on_closed_client_is_an_error() {
        let client = detached_client();
        assert_eq!(client.wait_open().await, Err(RpcError::ConnectionClosed));
        assert!(client.state().is_closed());
    }
}
