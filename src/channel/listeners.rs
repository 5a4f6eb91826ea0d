//! Multi-subscriber dispatch for inbound frames.
//!
//! Every raw text frame read from the persistent channel is handed to each
//! registered listener in registration order. Listeners are added and
//! removed independently; adding one never displaces another.
//!
//! # Deadlock Prevention
//!
//! The listener list is snapshotted under the lock, then the lock is
//! released before any callback runs. A callback may therefore add or
//! remove listeners (including itself) without deadlocking. A removal
//! takes effect from the next frame onward.

use std::sync::{Arc, PoisonError, RwLock};

/// Callback invoked with each raw inbound frame.
pub type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
struct ListenersInner {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

/// Ordered set of frame listeners.
#[derive(Default)]
pub struct Listeners {
    inner: RwLock<ListenersInner>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish_non_exhaustive()
    }
}

impl Listeners {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener at the end of the dispatch order.
    pub fn add(&self, listener: Listener) -> ListenerId {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.entries.len();
        inner.entries.retain(|(entry_id, _)| *entry_id != id);
        inner.entries.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one frame to every listener, in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, frame: &str) -> usize {
        let snapshot: Vec<Listener> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &snapshot {
            listener(frame);
        }
        snapshot.len()
    }
}
