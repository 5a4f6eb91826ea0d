//! Chat protocol over the persistent channel.
//!
//! A [`ChatSession`] registers one listener on the channel, folds inbound
//! frames into a [`ChatSnapshot`] (presence, feed, composing indicator,
//! input buffer), and publishes every change on a `watch` channel for the
//! presentation layer.
//!
//! # Sending
//!
//! [`ChatSession::send`] rejects blank text locally, queues a `message`
//! frame, clears the input buffer, and raises the composing indicator. The
//! indicator drops after a fixed delay unless a newer send re-raised it.
//!
//! The session holds only a weak sending handle: it never keeps the channel
//! alive, and a send after the channel is gone fails with a network error.

pub mod frame;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;

use self::frame::{ChatMessage, Frame, OutboundFrame, ProtocolError};
use crate::channel::{ChannelError, FrameSink, ListenerId, Listeners, PersistentChannel};
use crate::constants::{log_preview, LISTENER_LOG_PREVIEW};
use crate::error::ClientError;
use crate::notify::{Notice, Notifier};

/// Observable chat state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    /// Number of connected clients from the last `info` frame.
    pub presence: u64,
    /// Messages in server order.
    pub feed: Vec<ChatMessage>,
    /// Bumped each time `getMessages` replaces the whole feed.
    pub feed_revision: u64,
    /// Whether a recent send is still being acknowledged visually.
    pub composing: bool,
    /// Unsent input text.
    pub input: String,
}

/// State reachable from the channel listener and the composing timer.
struct ChatShared {
    state: Mutex<ChatSnapshot>,
    composing_generation: AtomicU64,
    updates: watch::Sender<ChatSnapshot>,
}

impl ChatShared {
    fn lock(&self) -> MutexGuard<'_, ChatSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the state and publish the result.
    fn update(&self, f: impl FnOnce(&mut ChatSnapshot)) {
        let snapshot = {
            let mut state = self.lock();
            f(&mut state);
            state.clone()
        };
        self.updates.send_replace(snapshot);
    }

    fn apply(&self, frame: Frame) {
        match frame {
            Frame::Info { total_clients } => {
                log::debug!("[Chat] Presence: {}", total_clients);
                self.update(|s| s.presence = total_clients);
            }
            Frame::GetMessages { list } => {
                log::debug!("[Chat] Feed replaced ({} messages)", list.len());
                self.update(|s| {
                    s.feed = list;
                    s.feed_revision += 1;
                });
            }
            Frame::Message(message) => {
                self.update(|s| s.feed.push(message));
            }
        }
    }

    fn handle_text(&self, text: &str) -> Result<(), ProtocolError> {
        match Frame::parse(text) {
            Ok(frame) => {
                self.apply(frame);
                Ok(())
            }
            Err(e @ ProtocolError::UnknownEvent(_)) => {
                log::debug!("[Chat] Ignoring frame: {}", e);
                Err(e)
            }
            Err(e) => {
                log::warn!(
                    "[Chat] Dropping frame: {} ({})",
                    e,
                    log_preview(text, LISTENER_LOG_PREVIEW)
                );
                Err(e)
            }
        }
    }

    /// Raise the composing indicator and return its generation.
    fn raise_composing(&self) -> u64 {
        let generation = self.composing_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.update(|s| {
            s.input.clear();
            s.composing = true;
        });
        generation
    }

    /// Drop the indicator if no newer send has raised it since `generation`.
    fn lower_composing(&self, generation: u64) {
        if self.composing_generation.load(Ordering::SeqCst) == generation {
            self.update(|s| s.composing = false);
        }
    }
}

/// Chat client bound to one persistent channel.
pub struct ChatSession {
    shared: Arc<ChatShared>,
    sink: Weak<dyn FrameSink>,
    notifier: Arc<dyn Notifier>,
    composing_for: Duration,
    registration: Option<(Weak<Listeners>, ListenerId)>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("state", &*self.shared.lock())
            .field("composing_for", &self.composing_for)
            .field("attached", &self.registration.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a detached session that sends through `sink`.
    ///
    /// Inbound frames are fed with [`Self::handle_frame_text`].
    pub fn new(
        sink: Weak<dyn FrameSink>,
        notifier: Arc<dyn Notifier>,
        composing_for: Duration,
    ) -> Self {
        let (updates, _) = watch::channel(ChatSnapshot::default());
        Self {
            shared: Arc::new(ChatShared {
                state: Mutex::new(ChatSnapshot::default()),
                composing_generation: AtomicU64::new(0),
                updates,
            }),
            sink,
            notifier,
            composing_for,
            registration: None,
        }
    }

    /// Create a session listening on `channel`.
    ///
    /// The listener is removed when the session is dropped.
    pub fn attach(
        channel: &PersistentChannel,
        notifier: Arc<dyn Notifier>,
        composing_for: Duration,
    ) -> Self {
        let mut session = Self::new(channel.sink(), notifier, composing_for);
        let shared = Arc::downgrade(&session.shared);
        let id = channel.subscribe(Arc::new(move |text: &str| {
            if let Some(shared) = shared.upgrade() {
                let _ = shared.handle_text(text);
            }
        }));
        session.registration = Some((Arc::downgrade(channel.listeners()), id));
        log::debug!("[Chat] Attached to channel");
        session
    }

    /// Parse and apply one raw inbound frame.
    ///
    /// Unparseable or unknown frames are logged and leave the state
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns the [`ProtocolError`] that caused the frame to be dropped.
    pub fn handle_frame_text(&self, text: &str) -> Result<(), ProtocolError> {
        self.shared.handle_text(text)
    }

    /// Apply an already-parsed frame.
    pub fn apply(&self, frame: Frame) {
        self.shared.apply(frame);
    }

    /// Connected client count.
    pub fn presence(&self) -> u64 {
        self.shared.lock().presence
    }

    /// Feed in server order.
    pub fn feed(&self) -> Vec<ChatMessage> {
        self.shared.lock().feed.clone()
    }

    /// Whether the composing indicator is up.
    pub fn is_composing(&self) -> bool {
        self.shared.lock().composing
    }

    /// Full current state.
    pub fn snapshot(&self) -> ChatSnapshot {
        self.shared.lock().clone()
    }

    /// Subscribe to state changes.
    pub fn watch(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Replace the input buffer.
    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.shared.update(|s| s.input = text);
    }

    /// Current input buffer.
    pub fn input(&self) -> String {
        self.shared.lock().input.clone()
    }

    /// Send `text` as a chat message.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Validation`] if `text` is empty or whitespace; nothing
    ///   is sent
    /// - [`ClientError::Network`] if the channel is gone or closed; a network
    ///   notice is emitted
    pub fn send(&self, text: &str) -> Result<(), ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::Validation("Message cannot be empty".to_string()));
        }

        let bytes = OutboundFrame::message(text).to_bytes()?;
        let result = match self.sink.upgrade() {
            Some(sink) => sink.send(bytes),
            None => Err(ChannelError::Closed),
        };
        if let Err(e) = result {
            log::warn!("[Chat] Send failed: {}", e);
            self.notifier.notify(Notice::network());
            return Err(e.into());
        }

        let generation = self.shared.raise_composing();
        self.schedule_composing_drop(generation);
        Ok(())
    }

    /// Send the input buffer.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`]. On failure the buffer is kept.
    pub fn send_input(&self) -> Result<(), ClientError> {
        let text = self.input();
        self.send(&text)
    }

    fn schedule_composing_drop(&self, generation: u64) {
        let shared = Arc::downgrade(&self.shared);
        let delay = self.composing_for;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(shared) = shared.upgrade() {
                        shared.lower_composing(generation);
                    }
                });
            }
            Err(_no_runtime) => {
                log::debug!("[Chat] No runtime for composing timer; lowering immediately");
                if let Some(shared) = shared.upgrade() {
                    shared.lower_composing(generation);
                }
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some((listeners, id)) = self.registration.take() {
            if let Some(listeners) = listeners.upgrade() {
                listeners.remove(id);
            }
        }
    }
}
