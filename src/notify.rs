//! User-visible side effects of the transport layer.
//!
//! The pipeline never talks to a UI directly. It hands [`Notice`]s to a
//! [`Notifier`] and asks a [`LogoutHandler`] to log the user out; the
//! presentation layer supplies both. Delivery is fire-and-forget: neither
//! trait may block the caller.

use tokio::sync::mpsc;

/// Category of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// Credentials were rejected. The session has been (or is being) cleared.
    Authentication,
    /// The server could not be reached or the exchange was interrupted.
    Network,
    /// A caller-side or server-reported input problem.
    Validation,
    /// Any other error reported by the server.
    Server,
}

/// One user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// What kind of problem this is.
    pub kind: NoticeKind,
    /// Human-readable text.
    pub message: String,
}

impl Notice {
    /// Create a notice.
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Generic network notice suggesting a retry.
    pub fn network() -> Self {
        Self::new(
            NoticeKind::Network,
            "Network error. Check your connection and try again.",
        )
    }
}

/// Receives user-visible notices.
pub trait Notifier: Send + Sync {
    /// Deliver a notice. Must return without waiting on the UI.
    fn notify(&self, notice: Notice);
}

/// Notifier that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Validation => log::info!("[Notice] {:?}: {}", notice.kind, notice.message),
            _ => log::warn!("[Notice] {:?}: {}", notice.kind, notice.message),
        }
    }
}

/// Notifier that forwards notices over an unbounded channel.
///
/// Sending never blocks. If the receiver is gone the notice is dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver the UI drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            log::trace!("[Notice] Receiver dropped, notice discarded");
        }
    }
}

/// Downstream logout, triggered once per cleared session.
pub trait LogoutHandler: Send + Sync {
    /// The session was cleared because of an authentication failure.
    fn logged_out(&self);
}

impl<F> LogoutHandler for F
where
    F: Fn() + Send + Sync,
{
    fn logged_out(&self) {
        self();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notice::network());
        notifier.notify(Notice::new(NoticeKind::Validation, "Message is empty"));

        assert_eq!(rx.recv().await.unwrap().kind, NoticeKind::Network);
        assert_eq!(rx.recv().await.unwrap().message, "Message is empty");
    }

    #[test]
    fn test_channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Notice::network());
    }

    #[test]
    fn test_closure_is_logout_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler = move || {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        handler.logged_out();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
