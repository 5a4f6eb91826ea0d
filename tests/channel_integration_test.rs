//! Integration tests for the persistent channel and the chat protocol.
//!
//! Each test runs an in-process `tokio-tungstenite` server on
//! `127.0.0.1:0` and connects the real client to it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatlink::notify::ChannelNotifier;
use chatlink::{ChannelState, ChatSnapshot, Client, ClientError, Config, PersistentChannel};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/api", listener.local_addr().unwrap());
    (listener, url)
}

/// Accept one connection, returning the socket and the requested URI.
async fn accept_one(listener: &TcpListener) -> (ServerWs, String) {
    let (stream, _) = listener.accept().await.unwrap();
    let uri = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&uri);
    let ws = accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *captured.lock().unwrap() = req.uri().to_string();
            Ok(resp)
        },
    )
    .await
    .unwrap();
    let uri = uri.lock().unwrap().clone();
    (ws, uri)
}

struct TestClient {
    client: Client,
    logouts: Arc<AtomicUsize>,
}

fn test_client(channel_url: &str, token: &str) -> TestClient {
    let config = Config {
        http_url: "http://127.0.0.1:1/graphql".to_string(),
        channel_url: channel_url.to_string(),
        token: token.to_string(),
        composing_indicator_ms: 2000,
    };
    let (notifier, _notices) = ChannelNotifier::new();
    let logouts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&logouts);
    let client = Client::new(
        config,
        Arc::new(notifier),
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    TestClient { client, logouts }
}

async fn wait_for(
    rx: &mut watch::Receiver<ChatSnapshot>,
    pred: impl FnMut(&ChatSnapshot) -> bool,
) -> ChatSnapshot {
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for chat state")
        .expect("chat session dropped")
        .clone()
}

async fn next_text(ws: &mut ServerWs) -> String {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => return text.to_string(),
            Some(Ok(_)) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_token_travels_as_query_parameter() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move { accept_one(&listener).await.1 });

    let t = test_client(&url, "abc123");
    t.client.open_channel().await.unwrap();

    assert_eq!(server.await.unwrap(), "/api?token=abc123");
    assert_eq!(t.client.session().channel_state(), Some(ChannelState::Open));
}

#[tokio::test]
async fn test_anonymous_channel_sends_empty_token() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move { accept_one(&listener).await.1 });

    let t = test_client(&url, "");
    t.client.open_channel().await.unwrap();

    assert_eq!(server.await.unwrap(), "/api?token=");
}

#[tokio::test]
async fn test_chat_send_and_receive() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        let first = next_text(&mut ws).await;
        ws.send(Message::Text(
            json!({ "event": "info", "totalClients": 5 }).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            json!({ "event": "getMessages", "list": [{ "text": "hi" }] }).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            json!({ "event": "message", "text": "yo", "memberData": { "id": "u2", "name": "Bo" } })
                .to_string(),
        ))
        .await
        .unwrap();
        (ws, first)
    });

    let t = test_client(&url, "tok");
    t.client.open_channel().await.unwrap();
    let chat = t.client.chat().unwrap();
    let mut updates = chat.watch();

    chat.send("hello").unwrap();

    let snapshot = wait_for(&mut updates, |s| s.presence == 5 && s.feed.len() == 2).await;
    let texts: Vec<&str> = snapshot.feed.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "yo"]);
    assert_eq!(
        snapshot.feed[1].sender.as_ref().and_then(|m| m.display_name()),
        Some("Bo")
    );

    let (_ws, first) = server.await.unwrap();
    let sent: Value = serde_json::from_str(&first).unwrap();
    assert_eq!(sent, json!({ "event": "message", "data": "hello" }));
}

#[tokio::test]
async fn test_unknown_frames_do_not_disturb_chat() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        next_text(&mut ws).await;
        for frame in [
            "not json".to_string(),
            json!({ "event": "typing", "who": "x" }).to_string(),
            json!({ "event": "info", "totalClients": 2 }).to_string(),
        ] {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        ws
    });

    let t = test_client(&url, "tok");
    t.client.open_channel().await.unwrap();
    let chat = t.client.chat().unwrap();
    let mut updates = chat.watch();
    chat.send("ready").unwrap();

    let snapshot = wait_for(&mut updates, |s| s.presence == 2).await;
    assert!(snapshot.feed.is_empty());
    assert_eq!(t.client.session().channel_state(), Some(ChannelState::Open));

    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_every_listener_sees_every_frame() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        next_text(&mut ws).await;
        ws.send(Message::Text("one".to_string())).await.unwrap();
        ws.send(Message::Text("two".to_string())).await.unwrap();
        ws
    });

    let channel = PersistentChannel::connect(&url, None).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for tag in ["a", "b"] {
        let seen = Arc::clone(&seen);
        channel.subscribe(Arc::new(move |frame: &str| {
            seen.lock().unwrap().push(format!("{tag}:{frame}"));
        }));
    }
    channel.send(b"go".to_vec()).unwrap();

    tokio::time::timeout(WAIT, async {
        while seen.lock().unwrap().len() < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["a:one", "b:one", "a:two", "b:two"]);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_server_close_is_terminal_without_reconnect() {
    let (listener, url) = bind().await;
    let listener = Arc::new(listener);
    let accept = Arc::clone(&listener);
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&accept).await;
        ws.close(None).await.unwrap();
    });

    let t = test_client(&url, "tok");
    t.client.open_channel().await.unwrap();
    server.await.unwrap();

    tokio::time::timeout(WAIT, async {
        while t.client.session().channel_state() != Some(ChannelState::Closed) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // No second connection attempt arrives.
    let second = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(second.is_err());
    assert_eq!(t.client.session().channel_state(), Some(ChannelState::Closed));

    let chat = t.client.chat().unwrap();
    assert!(matches!(chat.send("late"), Err(ClientError::Network { .. })));
}

#[tokio::test]
async fn test_rejected_handshake_is_authentication_failure() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = accept_hdr_async(
            stream,
            |_req: &Request, _resp: Response| -> Result<Response, ErrorResponse> {
                let mut err = ErrorResponse::new(Some("invalid token".to_string()));
                *err.status_mut() = StatusCode::UNAUTHORIZED;
                Err(err)
            },
        )
        .await;
    });

    let t = test_client(&url, "stale");
    let result = t.client.open_channel().await;
    server.await.unwrap();

    assert!(matches!(result, Err(ClientError::Authentication(_))));
    assert_eq!(t.client.session().token(), None);
    assert_eq!(t.client.session().channel_state(), None);
    assert_eq!(t.logouts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handshake_timeout() {
    // Accept TCP but never answer the upgrade.
    let (listener, url) = bind().await;
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let result =
        PersistentChannel::connect_with_timeout(&url, Some("t"), Duration::from_millis(200)).await;

    assert!(matches!(result, Err(chatlink::ChannelError::Timeout)));
}

#[tokio::test]
async fn test_logout_closes_channel() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        // Runs until the client closes.
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                return true;
            }
        }
        true
    });

    let t = test_client(&url, "tok");
    t.client.open_channel().await.unwrap();

    assert!(t.client.logout());
    assert_eq!(t.client.session().channel_state(), None);
    assert!(tokio::time::timeout(WAIT, server).await.unwrap().unwrap());
}

#[tokio::test]
async fn test_logout_during_handshake_discards_channel() {
    // Completes the upgrade only after the client has logged out.
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = tokio_tungstenite::accept_async(stream).await;
    });

    let t = test_client(&url, "tok");
    let (result, logged_out) = tokio::join!(t.client.open_channel(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        t.client.logout()
    });
    server.await.unwrap();

    assert!(logged_out);
    assert!(matches!(result, Err(ClientError::Authentication(_))));
    assert_eq!(t.client.session().channel_state(), None);
    assert_eq!(t.client.session().token(), None);
    assert_eq!(t.logouts.load(Ordering::SeqCst), 0);
}
