//! Chat wire frames.
//!
//! Every frame on the persistent channel is a JSON object whose `event`
//! field selects the payload shape.
//!
//! | Direction | `event`        | Payload                                       |
//! |-----------|----------------|-----------------------------------------------|
//! | inbound   | `info`         | `{ "totalClients": <int> }`                   |
//! | inbound   | `getMessages`  | `{ "list": [<message>, ...] }`                |
//! | inbound   | `message`      | `{ "text": <string>, "memberData": {...} }`   |
//! | outbound  | `message`      | `{ "data": <string> }`                        |
//! | outbound  | `subscribe`    | `{ "id", "operationName", "variables", "context" }` |
//! | outbound  | `unsubscribe`  | `{ "id" }`                                    |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::MemberRef;

/// One chat message as delivered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message body.
    pub text: String,
    /// Sender, when the server includes it.
    #[serde(rename = "memberData", default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<MemberRef>,
}

impl ChatMessage {
    /// Create a message without sender data.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: None,
        }
    }
}

/// Parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Presence update.
    Info {
        /// Number of connected clients.
        total_clients: u64,
    },
    /// Full feed snapshot, in server order.
    GetMessages {
        /// Messages replacing the local feed.
        list: Vec<ChatMessage>,
    },
    /// One new message.
    Message(ChatMessage),
}

/// Wire shape of the known inbound events.
#[derive(Deserialize)]
#[serde(tag = "event")]
enum WireFrame {
    #[serde(rename = "info")]
    Info {
        #[serde(rename = "totalClients")]
        total_clients: u64,
    },
    #[serde(rename = "getMessages")]
    GetMessages {
        #[serde(default)]
        list: Vec<ChatMessage>,
    },
    #[serde(rename = "message")]
    Message {
        text: String,
        #[serde(rename = "memberData", default)]
        sender: Option<MemberRef>,
    },
}

const KNOWN_EVENTS: [&str; 3] = ["info", "getMessages", "message"];

impl Frame {
    /// Parse one raw inbound frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] if the text is not JSON or the payload
    ///   does not match its event
    /// - [`ProtocolError::MissingEvent`] if there is no string `event` field
    /// - [`ProtocolError::UnknownEvent`] for any other discriminator
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let event = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingEvent)?;
        if !KNOWN_EVENTS.contains(&event) {
            return Err(ProtocolError::UnknownEvent(event.to_string()));
        }

        let wire: WireFrame = serde_json::from_value(value)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(match wire {
            WireFrame::Info { total_clients } => Self::Info { total_clients },
            WireFrame::GetMessages { list } => Self::GetMessages { list },
            WireFrame::Message { text, sender } => Self::Message(ChatMessage { text, sender }),
        })
    }
}

/// Frame sent from the client on the persistent channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum OutboundFrame {
    /// Chat message.
    Message {
        /// Message body.
        data: String,
    },
    /// Start a streaming operation.
    Subscribe {
        /// Client-chosen stream id.
        id: String,
        /// Operation name.
        #[serde(rename = "operationName")]
        operation_name: String,
        /// Operation document, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        /// Operation variables.
        variables: Map<String, Value>,
        /// Operation context (credentials included).
        context: BTreeMap<String, String>,
    },
    /// Stop a streaming operation.
    Unsubscribe {
        /// Stream id given in `subscribe`.
        id: String,
    },
}

impl OutboundFrame {
    /// Chat message frame.
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { data: text.into() }
    }

    /// Serialize to the bytes handed to the channel.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Frame-level protocol failure.
///
/// Inbound protocol errors are logged and the frame is dropped; they never
/// reach the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not JSON, or the payload does not fit its event.
    Malformed(String),
    /// No string `event` field.
    MissingEvent,
    /// Event name not handled by this client.
    UnknownEvent(String),
    /// Outbound frame could not be serialized.
    Encode(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed frame: {msg}"),
            Self::MissingEvent => write!(f, "Frame has no event field"),
            Self::UnknownEvent(event) => write!(f, "Unknown event: {event}"),
            Self::Encode(msg) => write!(f, "Failed to encode frame: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
