//! Integration tests for the RPC client against an in-process mock server.
//!
//! Each test starts a `tokio-tungstenite` server on an ephemeral loopback
//! port and runs a small script on the accepted socket: read requests,
//! answer them (possibly out of order), push broadcasts, or close.  The
//! client side goes through the public `RpcClient` API only.
//!
//! ```text
//! test body ── RpcClient ──ws://127.0.0.1:<port>/socket──▶ mock script
//! ```

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rproxy_console::{ConnectionError, ConnectionState, ConsoleConfig, RpcClient, RpcError};
use rproxy_core::protocol::{
    decode_request, encode_broadcast, encode_response, events, BroadcastChannel, Method,
    RequestFrame,
};
use rproxy_core::{CommandStatus, NameId};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

// ── Mock server helpers ───────────────────────────────────────────────────────

/// Starts a one-connection mock server running `script`.  Returns its URL.
async fn mock_server<F, Fut>(script: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = accept_async(tcp).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}/socket")
}

/// Reads frames until the next request.
async fn next_request(ws: &mut ServerWs) -> RequestFrame {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return decode_request(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a request, got {other:?}"),
        }
    }
}

async fn reply(ws: &mut ServerWs, request: &RequestFrame, outcome: Result<Value, Value>) {
    let text = encode_response(request.id, &outcome).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

async fn push(ws: &mut ServerWs, channel: BroadcastChannel, payload: Value) {
    let text = encode_broadcast(channel, &payload).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

/// A port with nothing listening on it.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}/socket")
}

// ── Request / response ────────────────────────────────────────────────────────

/// Open succeeds; `add("srv1")` resolves with the result sent on the same id.
#[tokio::test]
async fn test_request_resolves_with_result_on_same_id() {
    let url = mock_server(|mut ws| async move {
        let request = next_request(&mut ws).await;
        assert_eq!(request.method, "add");
        assert_eq!(request.params, json!("srv1"));
        reply(&mut ws, &request, Ok(json!(7))).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Open);

    let result = client.request_raw(Method::Add, json!("srv1")).await;

    assert_eq!(result, Ok(json!(7)));
}

#[tokio::test]
async fn test_typed_wrapper_decodes_result() {
    let url = mock_server(|mut ws| async move {
        let request = next_request(&mut ws).await;
        assert_eq!(request.method, "getCommandPorts");
        assert_eq!(request.params, json!({"server": "web", "id": 4}));
        reply(&mut ws, &request, Ok(json!([8080, 8443]))).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let ports = client.get_command_ports("web", 4).await;

    assert_eq!(ports, Ok(vec![8080, 8443]));
}

#[tokio::test]
async fn test_server_error_payload_is_passed_through() {
    let url = mock_server(|mut ws| async move {
        let request = next_request(&mut ws).await;
        reply(&mut ws, &request, Err(json!("unknown server"))).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let err = client.remove("ghost").await.unwrap_err();

    assert_eq!(err, RpcError::Application(json!("unknown server")));
    assert_eq!(err.server_message(), Some("unknown server"));
}

#[tokio::test]
async fn test_result_of_wrong_shape_is_a_decode_error() {
    let url = mock_server(|mut ws| async move {
        let request = next_request(&mut ws).await;
        reply(&mut ws, &request, Ok(json!("not a port list"))).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let result = client.get_command_ports("web", 1).await;

    assert!(matches!(result, Err(RpcError::Decode(_))));
}

/// `rename` then `remove` are issued; the server answers `remove` first and
/// `remove` resolves while `rename` is still pending.
#[tokio::test]
async fn test_responses_resolve_in_server_order_not_call_order() {
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let url = mock_server(|mut ws| async move {
        let rename = next_request(&mut ws).await;
        let remove = next_request(&mut ws).await;
        assert_eq!(rename.method, "rename");
        assert_eq!(remove.method, "remove");

        reply(&mut ws, &remove, Ok(Value::Null)).await;
        go_rx.await.unwrap();
        reply(&mut ws, &rename, Ok(Value::Null)).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let mut rename = client.rename("a", "b");
    let remove = client.remove("c");

    assert_eq!(remove.await, Ok(()));
    assert!(futures_util::poll!(&mut rename).is_pending());

    go_tx.send(()).unwrap();
    assert_eq!(rename.await, Ok(()));
}

/// Calls made before the handshake completes are written in call order.
#[tokio::test]
async fn test_requests_before_open_are_sent_in_call_order() {
    let url = mock_server(|mut ws| async move {
        let mut seen = Vec::new();
        for _ in 0..3 {
            let request = next_request(&mut ws).await;
            seen.push((request.id.get(), request.method.clone()));
            reply(&mut ws, &request, Ok(Value::Null)).await;
        }
        assert_eq!(
            seen,
            vec![
                (1, "add".to_string()),
                (2, "startRedirect".to_string()),
                (3, "remove".to_string()),
            ]
        );
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::spawn(ConsoleConfig::with_url(url));
    assert_eq!(client.state(), ConnectionState::Connecting);
    let add = client.add("a");
    let start = client.start_redirect("a", 1);
    let remove = client.remove("a");

    assert_eq!(add.await, Ok(None));
    assert_eq!(start.await, Ok(()));
    assert_eq!(remove.await, Ok(()));
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_malformed_frames_do_not_close_the_connection() {
    let url = mock_server(|mut ws| async move {
        let request = next_request(&mut ws).await;
        for junk in ["not json", r#"{"id":0,"result":1}"#, r#"{"id":"x"}"#, r#"{"id":5}"#] {
            ws.send(Message::Text(junk.to_string())).await.unwrap();
        }
        ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        reply(&mut ws, &request, Ok(json!(3))).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let result = client.add("srv").await;

    assert_eq!(result, Ok(Some(3)));
    assert_eq!(client.state(), ConnectionState::Open);
}

// ── Broadcasts ────────────────────────────────────────────────────────────────

/// A persistent subscription sees every matching frame, in arrival order.
#[tokio::test]
async fn test_persistent_subscription_receives_each_broadcast_in_order() {
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let url = mock_server(|mut ws| async move {
        go_rx.await.unwrap();
        for id in 1..=3 {
            let redirect = json!({"server": "web", "id": id, "from": 8000 + id, "to": "10.0.0.1:80"});
            push(&mut ws, BroadcastChannel::AddRedirect, redirect).await;
            // Unrelated traffic in between must not be routed here.
            push(&mut ws, BroadcastChannel::Add, json!("other")).await;
        }
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let mut redirects = client.wait_add_redirect().await.unwrap();
    go_tx.send(()).unwrap();

    for expected in 1..=3u64 {
        let redirect = redirects.next().await.unwrap().unwrap();
        assert_eq!(redirect.name_id(), NameId::new("web", expected));
    }
}

#[tokio::test]
async fn test_once_resolves_with_next_event_only() {
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let url = mock_server(|mut ws| async move {
        go_rx.await.unwrap();
        push(&mut ws, BroadcastChannel::Rename, json!(["a", "b"])).await;
        push(&mut ws, BroadcastChannel::Rename, json!(["b", "c"])).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let first = client.once::<events::Rename>();
    let mut all = client.wait_rename().await.unwrap();
    go_tx.send(()).unwrap();

    assert_eq!(first.await, Ok(("a".to_string(), "b".to_string())));
    assert_eq!(all.next().await, Some(Ok(("a".to_string(), "b".to_string()))));
    assert_eq!(all.next().await, Some(Ok(("b".to_string(), "c".to_string()))));
}

#[tokio::test]
async fn test_unknown_channel_is_ignored() {
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let url = mock_server(|mut ws| async move {
        go_rx.await.unwrap();
        ws.send(Message::Text(r#"{"id":-99,"result":"?"}"#.to_string()))
            .await
            .unwrap();
        push(&mut ws, BroadcastChannel::Remove, json!("old")).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let mut removed = client.wait_remove().await.unwrap();
    go_tx.send(()).unwrap();

    assert_eq!(removed.next().await, Some(Ok("old".to_string())));
}

/// The server pushes the list snapshot right after the handshake; a spawned
/// client that registers before the handshake does not miss it.
#[tokio::test]
async fn test_list_snapshot_pushed_on_connect_is_received() {
    let url = mock_server(|mut ws| async move {
        let snapshot = json!([
            ["web", [[1, 8080, "127.0.0.1:3000", true, "", [false, "web.local"]]], []],
            ["jobs", [], [[2, "/usr/bin/worker", [], "/srv", {}, 2, "exit status 1", null]]]
        ]);
        push(&mut ws, BroadcastChannel::List, snapshot).await;
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::spawn(ConsoleConfig::with_url(url));
    let list = client.once::<events::List>().await.unwrap();

    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "web");
    assert_eq!(list[0].redirects[0].matches[0].name, "web.local");
    assert_eq!(list[1].commands[0].status, CommandStatus::Exited);
    assert_eq!(list[1].commands[0].err, "exit status 1");
}

/// A server that pushes an empty list as soon as the socket is accepted.
async fn snapshot_on_accept_server() -> String {
    mock_server(|mut ws| async move {
        push(&mut ws, BroadcastChannel::List, json!([])).await;
        let _ = ws.next().await;
    })
    .await
}

/// `open` and then `wait_list`: the snapshot has usually been routed before
/// the subscription exists, and must still be seen.
#[tokio::test]
async fn test_wait_list_after_open_sees_snapshot_already_received() {
    let url = snapshot_on_accept_server().await;
    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut list = client.wait_list().await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), list.next())
        .await
        .expect("snapshot was not delivered");

    assert_eq!(first, Some(Ok(Vec::new())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wait_list_after_open_never_loses_snapshot() {
    for _ in 0..20 {
        let url = snapshot_on_accept_server().await;
        let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();

        let mut list = client.wait_list().await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(2), list.next()).await;

        assert!(matches!(first, Ok(Some(Ok(ref servers))) if servers.is_empty()));
        client.close().await;
    }
}

#[tokio::test]
async fn test_unsubscribed_stream_gets_nothing_new() {
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let url = mock_server(|mut ws| async move {
        go_rx.await.unwrap();
        push(&mut ws, BroadcastChannel::Add, json!("late")).await;
        let _ = done_tx.send(());
        let _ = ws.next().await;
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let mut first = client.wait_add().await.unwrap();
    let mut second = client.wait_add().await.unwrap();

    assert!(first.unsubscribe());
    assert!(!first.unsubscribe());
    go_tx.send(()).unwrap();
    done_rx.await.unwrap();

    assert_eq!(second.next().await, Some(Ok("late".to_string())));
    assert_eq!(first.next().await, None);
}

// ── Closure ───────────────────────────────────────────────────────────────────

/// The connection closes with one request pending and one subscription
/// registered: the request fails, the stream ends, and later calls fail fast.
#[tokio::test]
async fn test_close_rejects_pending_and_later_calls() {
    let url = mock_server(|mut ws| async move {
        let _request = next_request(&mut ws).await;
        ws.close(None).await.unwrap();
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    let mut stream = client.wait_add_redirect().await.unwrap();

    let pending = client.stop_redirect("web", 1).await;
    assert_eq!(pending, Err(RpcError::ConnectionClosed));

    assert!(stream.next().await.is_none());
    client.closed().await;
    assert_eq!(client.state(), ConnectionState::Closed);

    assert_eq!(
        client.once::<events::AddRedirect>().await.map(|_| ()),
        Err(RpcError::ConnectionClosed)
    );
    assert!(matches!(
        client.wait_add().await,
        Err(RpcError::ConnectionClosed)
    ));
    assert_eq!(client.add("x").await, Err(RpcError::ConnectionClosed));
}

#[tokio::test]
async fn test_explicit_close_sends_close_frame() {
    let (closed_tx, closed_rx) = oneshot::channel::<bool>();
    let url = mock_server(|mut ws| async move {
        let saw_close = loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) => break true,
                Some(Ok(_)) => continue,
                _ => break false,
            }
        };
        let _ = closed_tx.send(saw_close);
    })
    .await;

    let client = RpcClient::open(ConsoleConfig::with_url(url)).await.unwrap();
    client.close().await;

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(closed_rx.await.unwrap());
}

#[tokio::test]
async fn test_open_fails_when_server_is_unreachable() {
    let result = RpcClient::open(ConsoleConfig::with_url(closed_port_url())).await;
    assert!(matches!(result, Err(ConnectionError::Handshake { .. })));
}

#[tokio::test]
async fn test_spawned_client_rejects_queued_calls_when_handshake_fails() {
    let client = RpcClient::spawn(ConsoleConfig::with_url(closed_port_url()));
    let queued = client.add("srv");
    let snapshot = client.once::<events::List>();

    assert!(matches!(queued.await, Err(RpcError::ConnectionFailed(_))));
    assert!(matches!(snapshot.await, Err(RpcError::ConnectionFailed(_))));
    assert_eq!(client.wait_open().await, Err(RpcError::ConnectionClosed));
}

// ── Authentication ────────────────────────────────────────────────────────────

/// Starts a server that requires `expected` as the `Authorization` header.
async fn auth_server(expected: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let check = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let header = request
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok());
            if header == Some(expected) {
                Ok(response)
            } else {
                let mut rejection = ErrorResponse::new(None);
                *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                Err(rejection)
            }
        };
        if let Ok(mut ws) = accept_hdr_async(tcp, check).await {
            let _ = ws.next().await;
        }
    });
    format!("ws://{addr}/socket")
}

#[tokio::test]
async fn test_basic_credentials_are_sent_on_upgrade() {
    let url = auth_server("Basic YWRtaW46c2VjcmV0").await;
    let config = ConsoleConfig {
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        ..ConsoleConfig::with_url(url)
    };

    let client = RpcClient::open(config).await;

    assert!(client.is_ok());
}

#[tokio::test]
async fn test_missing_credentials_are_rejected_by_server() {
    let url = auth_server("Basic YWRtaW46c2VjcmV0").await;
    let config = ConsoleConfig {
        connect_timeout: Duration::from_secs(5),
        ..ConsoleConfig::with_url(url)
    };

    let result = RpcClient::open(config).await;

    assert!(matches!(result, Err(ConnectionError::Handshake { .. })));
}
