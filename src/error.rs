//! Typed outcome of the transport pipeline.
//!
//! Every public operation in the crate that can fail for a user-facing
//! reason returns [`ClientError`]. The presentation layer decides what to
//! show; the pipeline only classifies.

use crate::channel::ChannelError;
use crate::chat::frame::ProtocolError;
use crate::notify::NoticeKind;
use crate::transport::TransportError;

/// HTTP statuses treated as an authentication failure.
pub const AUTH_STATUSES: [u16; 2] = [401, 403];

/// Errors surfaced by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Credentials were rejected. The session is cleared.
    Authentication(String),
    /// The server could not be reached or the exchange was interrupted.
    Network {
        /// HTTP status, when the failure carried one.
        status: Option<u16>,
        /// Human-readable description.
        message: String,
    },
    /// Caller-side precondition failure. Never reaches the network.
    Validation(String),
    /// An inbound frame could not be understood.
    Protocol(ProtocolError),
}

impl ClientError {
    /// Whether this is an authentication failure.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Notice category matching this error.
    #[must_use]
    pub fn notice_kind(&self) -> Option<NoticeKind> {
        match self {
            Self::Authentication(_) => Some(NoticeKind::Authentication),
            Self::Network { .. } => Some(NoticeKind::Network),
            Self::Validation(_) => Some(NoticeKind::Validation),
            // Protocol errors are never shown to the user.
            Self::Protocol(_) => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication(msg) => write!(f, "Authentication failed: {msg}"),
            Self::Network {
                status: Some(status),
                message,
            } => write!(f, "Network error ({status}): {message}"),
            Self::Network {
                status: None,
                message,
            } => write!(f, "Network error: {message}"),
            Self::Validation(msg) => write!(f, "Invalid input: {msg}"),
            Self::Protocol(e) => write!(f, "Protocol error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ChannelError> for ClientError {
    fn from(e: ChannelError) -> Self {
        match e.status() {
            Some(status) if AUTH_STATUSES.contains(&status) => Self::Authentication(e.to_string()),
            status => Self::Network {
                status,
                message: e.to_string(),
            },
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Status { status, .. } if AUTH_STATUSES.contains(&status) => {
                Self::Authentication(e.to_string())
            }
            TransportError::Encode(msg) => Self::Validation(msg),
            other => Self::Network {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_handshake_401_is_authentication() {
        let err = ClientError::from(ChannelError::Rejected { status: 401 });
        assert!(err.is_authentication());
    }

    #[test]
    fn test_rejected_handshake_500_is_network() {
        let err = ClientError::from(ChannelError::Rejected { status: 500 });
        assert_eq!(
            err,
            ClientError::Network {
                status: Some(500),
                message: "Handshake rejected with status 500".to_string()
            }
        );
    }

    #[test]
    fn test_closed_channel_is_network() {
        let err = ClientError::from(ChannelError::Closed);
        assert_eq!(err.notice_kind(), Some(NoticeKind::Network));
    }

    #[test]
    fn test_transport_403_is_authentication() {
        let err = ClientError::from(TransportError::Status {
            status: 403,
            body: String::new(),
            errors: Vec::new(),
        });
        assert!(err.is_authentication());
    }

    #[test]
    fn test_protocol_errors_have_no_notice() {
        let err = ClientError::from(ProtocolError::MissingEvent);
        assert_eq!(err.notice_kind(), None);
    }
}
