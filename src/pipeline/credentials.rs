//! Credential injection.

use crate::operation::Operation;
use crate::session::Session;

/// Context key carrying the bearer credential.
pub const AUTHORIZATION: &str = "Authorization";

/// Attach the session credential to `op`.
///
/// With a token, sets `Authorization: Bearer <token>`. Without one, any
/// `Authorization` entry is removed so anonymous operations never carry a
/// credential. Runs per operation, so a token change applies to the next
/// operation without rebuilding anything.
pub fn inject(op: Operation, session: &Session) -> Operation {
    match session.bearer_token() {
        Some(token) => op
            .without_context(AUTHORIZATION)
            .context_entry(AUTHORIZATION, format!("Bearer {token}")),
        None => op.without_context(AUTHORIZATION),
    }
}
