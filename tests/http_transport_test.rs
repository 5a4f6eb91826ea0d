//! Integration tests for the HTTP request/response transport.
//!
//! Each test runs against a `wiremock` server and drives operations through
//! the full client pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chatlink::notify::ChannelNotifier;
use chatlink::{
    Attachment, Client, ClientError, Config, Dispatched, HttpTransport, NoticeKind, Operation,
    RequestTransport, TransportError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestClient {
    client: Client,
    notices: tokio::sync::mpsc::UnboundedReceiver<chatlink::Notice>,
    logouts: Arc<AtomicUsize>,
}

fn test_client(server: &MockServer, token: &str) -> TestClient {
    let config = Config {
        http_url: format!("{}/graphql", server.uri()),
        channel_url: "ws://127.0.0.1:1/api".to_string(),
        token: token.to_string(),
        composing_indicator_ms: 2000,
    };
    let (notifier, notices) = ChannelNotifier::new();
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
    TestClient {
        client,
        notices,
        logouts,
    }
}

#[tokio::test]
async fn test_query_posts_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "operationName": "GetEvent",
            "variables": { "id": 7 }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "event": { "id": 7 } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let t = test_client(&server, "");
    let result = t
        .client
        .execute(Operation::query("GetEvent").variable("id", json!(7)))
        .await
        .unwrap();

    let response = result.into_response().unwrap();
    assert_eq!(response.data, Some(json!({ "event": { "id": 7 } })));
    assert!(response.errors.is_empty());
}

#[tokio::test]
async fn test_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let t = test_client(&server, "abc123");
    t.client.execute(Operation::query("Me")).await.unwrap();
}

#[tokio::test]
async fn test_no_token_sends_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .mount(&server)
        .await;

    let t = test_client(&server, "");
    t.client.execute(Operation::query("GetEvent")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_invalid_token_error_clears_session_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": null, "errors": [{ "message": "Invalid token" }] })),
        )
        .mount(&server)
        .await;

    let mut t = test_client(&server, "stale");

    let first = t.client.execute(Operation::query("Me")).await.unwrap();
    let second = t.client.execute(Operation::query("Me")).await.unwrap();

    // The response is handed back unaltered.
    assert_eq!(first.into_response().unwrap().errors[0].message, "Invalid token");
    assert!(second.into_response().is_some());

    assert_eq!(t.client.session().token(), None);
    assert_eq!(t.logouts.load(Ordering::SeqCst), 1);
    assert_eq!(t.notices.recv().await.unwrap().kind, NoticeKind::Authentication);
}

#[tokio::test]
async fn test_401_status_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let t = test_client(&server, "stale");
    let result = t.client.execute(Operation::mutation("Rename")).await;

    assert!(matches!(result, Err(ClientError::Authentication(_))));
    assert_eq!(t.client.session().token(), None);
    assert_eq!(t.logouts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_failure_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut t = test_client(&server, "tok");
    let result = t.client.execute(Operation::query("GetEvent")).await;

    assert!(matches!(
        result,
        Err(ClientError::Network {
            status: Some(502),
            ..
        })
    ));
    assert_eq!(t.client.session().token().as_deref(), Some("tok"));
    assert_eq!(t.notices.recv().await.unwrap().kind, NoticeKind::Network);
    assert_eq!(t.logouts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_undecodable_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(format!("{}/graphql", server.uri())).unwrap();
    let result = transport.call(&Operation::query("GetEvent")).await;

    assert!(matches!(result, Err(TransportError::Decode(_))));
}

#[tokio::test]
async fn test_attachments_use_multipart_convention() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "ok": true } })))
        .mount(&server)
        .await;

    let t = test_client(&server, "");
    let op = Operation::mutation("UploadAvatar")
        .document("mutation UploadAvatar($file: Upload!) { upload(file: $file) }")
        .variable("file", json!("placeholder"))
        .attach(Attachment::new("file", "avatar.png", b"PNGDATA".to_vec()).content_type("image/png"));

    let result = t.client.execute(op).await.unwrap();
    assert!(matches!(result, Dispatched::Response(_)));

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"operations\""));
    assert!(body.contains("\"file\":null"));
    assert!(body.contains("name=\"map\""));
    assert!(body.contains(r#"{"0":["variables.file"]}"#));
    assert!(body.contains("filename=\"avatar.png\""));
    assert!(body.contains("PNGDATA"));
    assert!(!body.contains("placeholder"));
}
