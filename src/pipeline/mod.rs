//! Operation pipeline.
//!
//! Every operation goes through the same three stages:
//!
//! ```text
//! execute(op)
//!   └─ FailureInterceptor (observes the outcome)
//!        └─ credentials::inject (adds Authorization from the session)
//!             └─ router::route ──┬─ Request    → RequestTransport::call
//!                                └─ Persistent → subscribe frame on the channel
//! ```
//!
//! # Modules
//!
//! - [`credentials`] - bearer credential injection
//! - [`router`] - kind-based transport selection
//! - [`interceptor`] - failure classification and session clearing

pub mod credentials;
pub mod interceptor;
pub mod router;

use std::sync::Arc;

use uuid::Uuid;

use self::interceptor::FailureInterceptor;
use self::router::Route;
use crate::chat::frame::OutboundFrame;
use crate::error::ClientError;
use crate::notify::{LogoutHandler, Notifier};
use crate::operation::Operation;
use crate::session::SessionStore;
use crate::transport::{RequestTransport, Response, TransportError};

/// Identifies a streaming operation started on the persistent channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl StreamId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of executing an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Request/response result, returned unaltered.
    Response(Response),
    /// Streaming operation accepted by the channel. Results arrive as
    /// inbound frames.
    Streaming(StreamId),
}

impl Dispatched {
    /// The response, if this was a request/response call.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Response(response) => Some(response),
            Self::Streaming(_) => None,
        }
    }
}

/// Composed interceptor, injector, and router.
pub struct Pipeline {
    session: Arc<SessionStore>,
    request: Arc<dyn RequestTransport>,
    interceptor: FailureInterceptor,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build the pipeline.
    pub fn new(
        session: Arc<SessionStore>,
        request: Arc<dyn RequestTransport>,
        notifier: Arc<dyn Notifier>,
        logout: Arc<dyn LogoutHandler>,
    ) -> Self {
        let interceptor = FailureInterceptor::new(Arc::clone(&session), notifier, logout);
        Self {
            session,
            request,
            interceptor,
        }
    }

    /// The failure interceptor, for outcomes produced outside `execute`.
    pub fn interceptor(&self) -> &FailureInterceptor {
        &self.interceptor
    }

    /// Execute one operation.
    ///
    /// Queries and mutations resolve with the server response (which may
    /// itself carry errors). Subscriptions resolve once the subscribe frame
    /// is queued on the persistent channel.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] for failures below the structured-response
    /// level. Side effects (notices, session clearing) have already been
    /// applied when this returns.
    pub async fn execute(&self, op: Operation) -> Result<Dispatched, ClientError> {
        let session = self.session.snapshot();
        let op = credentials::inject(op, &session);
        let route = router::route(&op);

        log::debug!("[Pipeline] {} {} -> {:?}", op.kind(), op.name(), route);

        let outcome = match route {
            Route::Request => self.request.call(&op).await.map(Dispatched::Response),
            Route::Persistent => self.start_stream(&op).map(Dispatched::Streaming),
        };
        self.interceptor.observe(op.name(), &session, outcome)
    }

    /// Stop a streaming operation.
    ///
    /// # Errors
    ///
    /// Returns a network error if the channel is gone.
    pub fn cancel_stream(&self, id: StreamId) -> Result<(), ClientError> {
        let frame = OutboundFrame::Unsubscribe { id: id.to_string() };
        self.session.send_frame(frame.to_bytes()?)?;
        log::debug!("[Pipeline] Cancelled stream {}", id);
        Ok(())
    }

    fn start_stream(&self, op: &Operation) -> Result<StreamId, TransportError> {
        let id = StreamId::new();
        let frame = OutboundFrame::Subscribe {
            id: id.to_string(),
            operation_name: op.name().to_string(),
            query: op.document_text().map(str::to_string),
            variables: op.variables_map().clone(),
            context: op.context().clone(),
        };
        let bytes = frame
            .to_bytes()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.session.send_frame(bytes)?;
        log::debug!("[Pipeline] Started stream {} for {}", id, op.name());
        Ok(id)
    }
}
