//! Chatlink - client-side transport layer with a realtime chat protocol.
//!
//! Routes outgoing operations to one of two transports (request/response
//! over HTTP, or a persistent WebSocket channel), attaches the session
//! credential, and turns failures into typed errors plus user-visible
//! notices.
//!
//! # Architecture
//!
//! ```text
//! Client (bootstrap context)
//!   ├── SessionStore ── owns ──> PersistentChannel ──> Listeners ──> ChatSession
//!   └── Pipeline
//!         FailureInterceptor → credentials::inject → router::route
//!                                                     ├── HttpTransport
//!                                                     └── PersistentChannel
//! ```
//!
//! # Modules
//!
//! - [`client`] - bootstrap context tying everything together
//! - [`pipeline`] - interceptor, credential injector, router
//! - [`transport`] - request/response transport seam and HTTP implementation
//! - [`channel`] - persistent channel and listener set
//! - [`chat`] - chat protocol state
//! - [`session`] - session store
//! - [`config`] - configuration loading/saving

// Library modules
pub mod channel;
pub mod chat;
pub mod client;
pub mod pipeline;
pub mod transport;
pub mod ws;

pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod notify;
pub mod operation;
pub mod session;

// Re-export commonly used types
pub use channel::{ChannelError, ChannelState, PersistentChannel};
pub use chat::{ChatSession, ChatSnapshot};
pub use client::Client;
pub use config::Config;
pub use error::ClientError;
pub use notify::{LogNotifier, LogoutHandler, Notice, NoticeKind, Notifier};
pub use operation::{Attachment, Operation, OperationKind};
pub use pipeline::{Dispatched, Pipeline, StreamId};
pub use session::{MemberRef, Session, SessionStore};
pub use transport::{HttpTransport, RequestTransport, Response, ServerError, TransportError};
