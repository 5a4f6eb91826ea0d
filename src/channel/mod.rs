//! Persistent channel abstraction.
//!
//! This module provides the long-lived bidirectional connection that carries
//! streaming operations and the chat protocol, plus the small types shared by
//! everything that rides on it.
//!
//! # Architecture
//!
//! ```text
//! PersistentChannel (owned by SessionStore)
//!     │
//!     ├── writer task  <── FrameSink::send (never suspends)
//!     │
//!     └── reader task ──> Listeners (ordered, independently added/removed)
//!                              ├── ChatSession dispatcher
//!                              └── any other observer
//! ```
//!
//! # State machine
//!
//! `Connecting → Open → Closed`. `Closed` is terminal: there is no
//! reconnecting state. A dropped connection stays dead until a new
//! [`PersistentChannel`] is constructed.

pub mod listeners;
pub mod persistent;

use std::sync::{PoisonError, RwLock};

/// Connection state for the persistent channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Handshake in progress.
    #[default]
    Connecting,
    /// Handshake complete, frames flowing.
    Open,
    /// Closed by either side or failed. Terminal.
    Closed,
}

impl ChannelState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Open)
                | (Self::Connecting, Self::Closed)
                | (Self::Open, Self::Closed)
        )
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Connection state shared between the channel handle and its tasks.
#[derive(Debug, Default)]
pub struct SharedChannelState {
    state: RwLock<ChannelState>,
}

impl SharedChannelState {
    /// Create state in `Connecting`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn get(&self) -> ChannelState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Returns `true` if the state changed.
    pub fn advance(&self, next: ChannelState) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.can_transition_to(next) {
            log::debug!("[Channel] State {} -> {}", *state, next);
            *state = next;
            true
        } else {
            false
        }
    }

    /// Check if open.
    pub fn is_open(&self) -> bool {
        self.get() == ChannelState::Open
    }
}

/// Errors that can occur on the persistent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The endpoint URL could not be parsed.
    InvalidUrl(String),
    /// Failed to establish the connection.
    ConnectionFailed(String),
    /// The server refused the handshake with an HTTP status.
    Rejected {
        /// HTTP status of the refused upgrade.
        status: u16,
    },
    /// The handshake did not complete in time.
    Timeout,
    /// Failed to send a frame.
    SendFailed(String),
    /// The channel is closed (or was dropped).
    Closed,
}

impl ChannelError {
    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(msg) => write!(f, "Invalid channel URL: {msg}"),
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::Rejected { status } => write!(f, "Handshake rejected with status {status}"),
            Self::Timeout => write!(f, "Handshake timed out"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::Closed => write!(f, "Channel closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Outbound side of the persistent channel.
///
/// `send` queues the frame and returns immediately; delivery is not
/// confirmed.
pub trait FrameSink: Send + Sync {
    /// Queue one frame for sending.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Closed` if the channel is no longer open.
    fn send(&self, bytes: Vec<u8>) -> Result<(), ChannelError>;
}

// Re-exports
pub use listeners::{Listener, ListenerId, Listeners};
pub use persistent::PersistentChannel;
