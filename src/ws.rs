//! Shared WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves. All WebSocket consumers in the crate should
//! use this module rather than `tokio-tungstenite` directly.
//!
//! # Architecture
//!
//! A single [`connect`] function handles URL→request building, header
//! insertion, and TLS negotiation. It returns a ([`WsWriter`], [`WsReader`])
//! pair so the writer and reader can live in separate tasks.
//!
//! [`channel_url`] builds the persistent channel URL. The bearer token
//! travels as a `token` query parameter, not a header, because the upgrade
//! handshake is the only request the server sees.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use crate::channel::ChannelError;

/// Concrete WebSocket stream type (avoids repeating the 6-line generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket message.
#[derive(Debug)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a UTF-8 text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
        self.sink
            .send(tungstenite::Message::Text(text))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    /// Send a binary frame.
    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), ChannelError> {
        self.sink
            .send(tungstenite::Message::Binary(data))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    /// Send a pong frame in response to a ping.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), ChannelError> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    /// Send a close frame, then flush and close the sink.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.sink
            .send(tungstenite::Message::Close(None))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        self.sink
            .close()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next message, returning `None` when the stream ends.
    ///
    /// Raw `Frame` variants are skipped internally.
    pub async fn recv(&mut self) -> Option<Result<WsMessage, ChannelError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(WsMessage::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(WsMessage::Binary(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(WsMessage::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(WsMessage::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Frame(_))) => {
                    // Raw frames are not surfaced
                    continue;
                }
                Some(Err(e)) => {
                    return Some(Err(ChannelError::ConnectionFailed(format!(
                        "WebSocket read error: {e}"
                    ))));
                }
                None => return None,
            }
        }
    }
}

/// Connect to a WebSocket URL with optional headers.
///
/// Builds an HTTP request from `url`, inserts each `(name, value)` header,
/// then performs the WebSocket handshake. A handshake answered with an HTTP
/// error status is reported as [`ChannelError::Rejected`] so callers can
/// tell a refused credential from an unreachable host.
pub async fn connect(
    url: &str,
    headers: &[(&str, &str)],
) -> Result<(WsWriter, WsReader), ChannelError> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .map_err(|e| ChannelError::InvalidUrl(format!("{}: {e}", redact_token(url))))?;

    for &(name, value) in headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ChannelError::ConnectionFailed(format!("invalid header name {name}: {e}")))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .map_err(|e| ChannelError::ConnectionFailed(format!("invalid header value for {name}: {e}")))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| match e {
            tungstenite::Error::Http(response) => ChannelError::Rejected {
                status: response.status().as_u16(),
            },
            tungstenite::Error::Url(e) => ChannelError::InvalidUrl(e.to_string()),
            other => ChannelError::ConnectionFailed(format!("WebSocket connect failed: {other}")),
        })?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Build the persistent channel URL: `<endpoint>?token=<token-or-empty>`.
///
/// Any query already present on the endpoint is kept and the token is
/// appended after it.
pub fn channel_url(endpoint: &str, token: Option<&str>) -> Result<String, ChannelError> {
    let mut url = url::Url::parse(&http_to_ws_scheme(endpoint))
        .map_err(|e| ChannelError::InvalidUrl(format!("{endpoint}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("token", token.unwrap_or_default());
    Ok(url.to_string())
}

/// Replace the `token` query value with `***` for log output.
#[must_use]
pub fn redact_token(url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    if !parsed.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            if k == "token" && !v.is_empty() {
                (k.into_owned(), "***".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(
            http_to_ws_scheme("https://example.com"),
            "wss://example.com"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(
            http_to_ws_scheme("http://localhost:4000"),
            "ws://localhost:4000"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_wss_passthrough() {
        assert_eq!(
            http_to_ws_scheme("wss://example.com/api"),
            "wss://example.com/api"
        );
    }

    #[test]
    fn test_channel_url_with_token() {
        assert_eq!(
            channel_url("wss://host/api", Some("abc123")).unwrap(),
            "wss://host/api?token=abc123"
        );
    }

    #[test]
    fn test_channel_url_without_token_sends_empty_param() {
        assert_eq!(
            channel_url("wss://host/api", None).unwrap(),
            "wss://host/api?token="
        );
    }

    #[test]
    fn test_channel_url_converts_http_scheme() {
        assert_eq!(
            channel_url("https://host/api", Some("t")).unwrap(),
            "wss://host/api?token=t"
        );
    }

    #[test]
    fn test_channel_url_keeps_existing_query() {
        assert_eq!(
            channel_url("wss://host/api?room=main", Some("t")).unwrap(),
            "wss://host/api?room=main&token=t"
        );
    }

    #[test]
    fn test_channel_url_rejects_garbage() {
        assert!(matches!(
            channel_url("not a url", Some("t")),
            Err(ChannelError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(
            redact_token("wss://host/api?token=abc123"),
            "wss://host/api?token=***"
        );
        assert_eq!(redact_token("wss://host/api?token="), "wss://host/api?token=");
        assert_eq!(redact_token("wss://host/api"), "wss://host/api");
    }

    #[tokio::test]
    async fn test_connect_invalid_url_returns_error() {
        let result = connect("not-a-url", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_returns_error() {
        let result = connect("ws://127.0.0.1:1/invalid", &[]).await;
        assert!(matches!(result, Err(ChannelError::ConnectionFailed(_))));
    }
}
