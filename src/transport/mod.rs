//! Request/response transport.
//!
//! Defines the [`RequestTransport`] seam used by the pipeline for every
//! query and mutation, plus the response and error types it produces.
//!
//! # Modules
//!
//! - [`http`] - reqwest-backed implementation (JSON and multipart bodies)

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::ChannelError;
use crate::operation::Operation;

/// One error reported by the server inside a response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Human-readable message.
    pub message: String,
    /// Free-form extensions; `extensions.code` carries the error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
    /// Top-level code used by some servers instead of `extensions.code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServerError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
            code: None,
        }
    }

    /// Set `extensions.code`.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let mut extensions = self.extensions.take().unwrap_or_default();
        extensions.insert("code".to_string(), Value::String(code.into()));
        self.extensions = Some(extensions);
        self
    }

    /// Error code from `extensions.code`, falling back to `code`.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
            .or(self.code.as_deref())
    }
}

/// Decoded response body.
///
/// A response may carry both data and errors; the caller always receives
/// it as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Result payload.
    #[serde(default)]
    pub data: Option<Value>,
    /// Errors reported alongside (or instead of) the data.
    #[serde(default)]
    pub errors: Vec<ServerError>,
}

impl Response {
    /// Whether the server reported any error.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Failure below the structured-response level.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No exchange happened (DNS, refused connection, reset, ...).
    Connection(String),
    /// The server answered with a non-success status.
    Status {
        /// HTTP status.
        status: u16,
        /// Raw body (may be empty).
        body: String,
        /// Structured errors, when the body was a response document.
        errors: Vec<ServerError>,
    },
    /// The response body could not be decoded.
    Decode(String),
    /// The request could not be built.
    Encode(String),
}

impl TransportError {
    /// HTTP status, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "Connection failed: {msg}"),
            Self::Status { status, body, .. } if body.is_empty() => {
                write!(f, "Server returned {status}")
            }
            Self::Status { status, body, .. } => write!(f, "Server returned {status}: {body}"),
            Self::Decode(msg) => write!(f, "Invalid response: {msg}"),
            Self::Encode(msg) => write!(f, "Invalid request: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<ChannelError> for TransportError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Rejected { status } => Self::Status {
                status,
                body: String::new(),
                errors: Vec::new(),
            },
            ChannelError::InvalidUrl(msg) => Self::Encode(msg),
            other => Self::Connection(other.to_string()),
        }
    }
}

/// Carries one query or mutation per call.
///
/// Implementations keep no per-call state: each call is an independent
/// exchange.
#[async_trait]
pub trait RequestTransport: Send + Sync {
    /// Perform one exchange for `op`.
    ///
    /// A response with `errors` is still `Ok`; only failures below the
    /// structured level are `Err`.
    async fn call(&self, op: &Operation) -> Result<Response, TransportError>;
}

// Re-exports
pub use self::http::HttpTransport;
