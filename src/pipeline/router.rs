//! Transport selection.

use crate::operation::{Operation, OperationKind};

/// Which transport carries an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Request/response (HTTP).
    Request,
    /// Persistent channel.
    Persistent,
}

/// Route for an operation kind.
///
/// Subscriptions go to the persistent channel; everything else is a
/// request/response call.
pub const fn route_kind(kind: OperationKind) -> Route {
    match kind {
        OperationKind::Subscription => Route::Persistent,
        OperationKind::Query | OperationKind::Mutation => Route::Request,
    }
}

/// Route for `op`. Depends only on its kind.
pub fn route(op: &Operation) -> Route {
    route_kind(op.kind())
}
