//! Failure interceptor.
//!
//! Observes the outcome of every operation, emits user-visible notices, and
//! clears the session on authentication failures. Data returned to the
//! caller is never altered: a response carrying errors is still handed back
//! as-is.
//!
//! # Classification
//!
//! | Source                              | Class          |
//! |-------------------------------------|----------------|
//! | 401/403 status                      | Authentication |
//! | code `UNAUTHENTICATED`, `UNAUTHORIZED`, `FORBIDDEN`, `INVALID_TOKEN`, `TOKEN_EXPIRED` | Authentication |
//! | message mentioning an invalid/expired token or unauthorized access | Authentication |
//! | code `BAD_USER_INPUT`, `VALIDATION_ERROR`, `GRAPHQL_VALIDATION_FAILED` | Validation |
//! | any other structured error          | Server         |
//! | any other transport failure         | Network        |

use std::sync::Arc;

use super::Dispatched;
use crate::error::{ClientError, AUTH_STATUSES};
use crate::notify::{LogoutHandler, Notice, NoticeKind, Notifier};
use crate::session::{Session, SessionStore};
use crate::transport::{ServerError, TransportError};

const AUTH_CODES: [&str; 5] = [
    "UNAUTHENTICATED",
    "UNAUTHORIZED",
    "FORBIDDEN",
    "INVALID_TOKEN",
    "TOKEN_EXPIRED",
];

const VALIDATION_CODES: [&str; 3] = [
    "BAD_USER_INPUT",
    "VALIDATION_ERROR",
    "GRAPHQL_VALIDATION_FAILED",
];

const AUTH_PHRASES: [&str; 6] = [
    "invalid token",
    "token expired",
    "expired token",
    "jwt expired",
    "unauthorized",
    "unauthenticated",
];

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Credentials rejected.
    Authentication,
    /// Exchange failed below the structured level.
    Network,
    /// Input rejected by the server.
    Validation,
    /// Any other server-reported error.
    Server,
}

impl FailureClass {
    fn notice_kind(self) -> NoticeKind {
        match self {
            Self::Authentication => NoticeKind::Authentication,
            Self::Network => NoticeKind::Network,
            Self::Validation => NoticeKind::Validation,
            Self::Server => NoticeKind::Server,
        }
    }
}

/// Classify one structured server error by code, then by message.
pub fn classify_server_error(error: &ServerError) -> FailureClass {
    if let Some(code) = error.code() {
        let code = code.to_ascii_uppercase();
        if AUTH_CODES.contains(&code.as_str()) {
            return FailureClass::Authentication;
        }
        if VALIDATION_CODES.contains(&code.as_str()) {
            return FailureClass::Validation;
        }
    }

    let message = error.message.to_ascii_lowercase();
    if AUTH_PHRASES.iter().any(|phrase| message.contains(phrase)) {
        FailureClass::Authentication
    } else {
        FailureClass::Server
    }
}

/// Classify a transport failure.
pub fn classify_transport_error(error: &TransportError) -> FailureClass {
    match error {
        TransportError::Status { status, .. } if AUTH_STATUSES.contains(status) => {
            FailureClass::Authentication
        }
        TransportError::Status { errors, .. }
            if errors
                .iter()
                .any(|e| classify_server_error(e) == FailureClass::Authentication) =>
        {
            FailureClass::Authentication
        }
        TransportError::Encode(_) => FailureClass::Validation,
        _ => FailureClass::Network,
    }
}

/// Applies the side effects of operation failures.
pub struct FailureInterceptor {
    session: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    logout: Arc<dyn LogoutHandler>,
}

impl std::fmt::Debug for FailureInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureInterceptor").finish_non_exhaustive()
    }
}

impl FailureInterceptor {
    /// Create an interceptor acting on `session`.
    pub fn new(
        session: Arc<SessionStore>,
        notifier: Arc<dyn Notifier>,
        logout: Arc<dyn LogoutHandler>,
    ) -> Self {
        Self {
            session,
            notifier,
            logout,
        }
    }

    /// Observe the outcome of `operation`, sent under `session`.
    ///
    /// Successful outcomes pass through unchanged; errors inside a response
    /// only produce side effects.
    pub fn observe(
        &self,
        operation: &str,
        session: &Session,
        outcome: Result<Dispatched, TransportError>,
    ) -> Result<Dispatched, ClientError> {
        match outcome {
            Ok(Dispatched::Response(response)) => {
                if response.has_errors() {
                    self.on_server_errors(operation, session, &response.errors);
                }
                Ok(Dispatched::Response(response))
            }
            Ok(streaming) => Ok(streaming),
            Err(e) => Err(self.on_transport_error(operation, session, e)),
        }
    }

    /// Handle a failure that produced no response.
    pub fn on_transport_error(
        &self,
        operation: &str,
        session: &Session,
        error: TransportError,
    ) -> ClientError {
        let class = classify_transport_error(&error);
        log::warn!("[Pipeline] {} failed ({:?}): {}", operation, class, error);

        match class {
            FailureClass::Authentication => {
                let message = error
                    .status()
                    .map_or_else(|| error.to_string(), |s| format!("Server returned {s}"));
                self.authentication_failed(session, &message);
                ClientError::Authentication(message)
            }
            FailureClass::Validation => {
                let err = ClientError::from(error);
                self.notifier
                    .notify(Notice::new(NoticeKind::Validation, err.to_string()));
                err
            }
            FailureClass::Network | FailureClass::Server => {
                self.notifier.notify(Notice::network());
                ClientError::Network {
                    status: error.status(),
                    message: error.to_string(),
                }
            }
        }
    }

    fn on_server_errors(&self, operation: &str, session: &Session, errors: &[ServerError]) {
        let mut auth_message = None;
        for error in errors {
            let class = classify_server_error(error);
            log::debug!(
                "[Pipeline] {} reported {:?} error: {}",
                operation,
                class,
                error.message
            );
            match class {
                FailureClass::Authentication => {
                    auth_message.get_or_insert_with(|| error.message.clone());
                }
                other => self
                    .notifier
                    .notify(Notice::new(other.notice_kind(), error.message.clone())),
            }
        }

        if let Some(message) = auth_message {
            log::warn!("[Pipeline] {} rejected credentials: {}", operation, message);
            self.authentication_failed(session, &message);
        }
    }

    /// Clear the session the failed operation was sent under.
    ///
    /// The notice and logout fire only when this call actually cleared it. A
    /// rejection of an anonymous operation has nothing to clear and only
    /// surfaces the notice.
    fn authentication_failed(&self, session: &Session, message: &str) {
        if !session.is_authenticated() {
            self.notifier
                .notify(Notice::new(NoticeKind::Authentication, message));
            return;
        }
        if self.session.clear_epoch(session.epoch()) {
            log::info!("[Pipeline] Session cleared; logging out");
            self.notifier
                .notify(Notice::new(NoticeKind::Authentication, message));
            self.logout.logged_out();
        }
    }
}
