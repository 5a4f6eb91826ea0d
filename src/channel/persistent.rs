//! Persistent channel transport.
//!
//! [`PersistentChannel`] owns one WebSocket connection for the lifetime of a
//! session. It carries streaming operations and the chat protocol.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ── handshake (30s limit) ──> Open ──> Closed
//!                    │                              ▲
//!                    └──── failure/timeout ─────────┘
//! ```
//!
//! There is no automatic reconnect. When the server drops the connection the
//! channel moves to `Closed` and stays there; the owner decides whether to
//! construct a new one.
//!
//! # Tasks
//!
//! - **writer**: drains the outgoing queue into the socket. `send` only
//!   enqueues, so it never suspends the caller.
//! - **reader**: reads frames in arrival order and hands each text frame to
//!   the [`Listeners`] set. Pings are answered through the writer queue.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ChannelError, ChannelState, FrameSink, Listener, ListenerId, Listeners, SharedChannelState};
use crate::constants::{log_preview, CHANNEL_HANDSHAKE_TIMEOUT, LISTENER_LOG_PREVIEW};
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Item in the writer task's queue.
#[derive(Debug)]
enum Outgoing {
    /// UTF-8 frame.
    Text(String),
    /// Non-UTF-8 payload.
    Binary(Vec<u8>),
    /// Reply to a server ping.
    Pong(Vec<u8>),
    /// Client-initiated close.
    Close,
    /// Reader saw the connection end; stop without sending anything.
    Shutdown,
}

/// State shared by the channel handle, its sink references, and its tasks.
struct ChannelShared {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    state: Arc<SharedChannelState>,
    listeners: Arc<Listeners>,
}

impl FrameSink for ChannelShared {
    fn send(&self, bytes: Vec<u8>) -> Result<(), ChannelError> {
        if !self.state.is_open() {
            return Err(ChannelError::Closed);
        }
        let item = match String::from_utf8(bytes) {
            Ok(text) => Outgoing::Text(text),
            Err(e) => Outgoing::Binary(e.into_bytes()),
        };
        self.outgoing
            .send(item)
            .map_err(|_closed| ChannelError::Closed)
    }
}

/// Live persistent channel connection.
///
/// Exactly one owner (the session store) holds this value. Other components
/// get a [`Weak`] sink from [`PersistentChannel::sink`] and must tolerate the
/// channel disappearing underneath them.
pub struct PersistentChannel {
    shared: Arc<ChannelShared>,
    url: String,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for PersistentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentChannel")
            .field("url", &ws::redact_token(&self.url))
            .field("state", &self.shared.state.get())
            .field("listeners", &self.shared.listeners.len())
            .finish_non_exhaustive()
    }
}

impl PersistentChannel {
    /// Open a connection to `endpoint`, passing `token` as a connection parameter.
    ///
    /// Resolves once the handshake has completed or failed.
    pub async fn connect(endpoint: &str, token: Option<&str>) -> Result<Self, ChannelError> {
        Self::connect_with_timeout(endpoint, token, CHANNEL_HANDSHAKE_TIMEOUT).await
    }

    /// Like [`Self::connect`] with an explicit handshake timeout.
    pub async fn connect_with_timeout(
        endpoint: &str,
        token: Option<&str>,
        handshake_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let url = ws::channel_url(endpoint, token)?;
        let state = Arc::new(SharedChannelState::new());

        log::info!("[Channel] Connecting to {}", ws::redact_token(&url));

        let (writer, reader) = match tokio::time::timeout(handshake_timeout, ws::connect(&url, &[])).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                state.advance(ChannelState::Closed);
                log::warn!("[Channel] Error: {}", e);
                return Err(e);
            }
            Err(_elapsed) => {
                state.advance(ChannelState::Closed);
                log::warn!(
                    "[Channel] Error: handshake exceeded {}s",
                    handshake_timeout.as_secs()
                );
                return Err(ChannelError::Timeout);
            }
        };

        state.advance(ChannelState::Open);
        log::info!("[Channel] Open");

        let listeners = Arc::new(Listeners::new());
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_writer(writer, outgoing_rx, Arc::clone(&state)));
        let reader = tokio::spawn(run_reader(
            reader,
            Arc::clone(&listeners),
            Arc::clone(&state),
            outgoing_tx.clone(),
        ));

        Ok(Self {
            shared: Arc::new(ChannelShared {
                outgoing: outgoing_tx,
                state,
                listeners,
            }),
            url,
            reader,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        self.shared.state.get()
    }

    /// URL this channel connected to (contains the token; redact before logging).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue a frame. Never suspends.
    pub fn send(&self, bytes: Vec<u8>) -> Result<(), ChannelError> {
        self.shared.send(bytes)
    }

    /// Weak sending handle that does not keep the channel alive.
    pub fn sink(&self) -> Weak<dyn FrameSink> {
        let weak: Weak<ChannelShared> = Arc::downgrade(&self.shared);
        weak
    }

    /// Inbound listener set.
    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.shared.listeners
    }

    /// Register an inbound listener.
    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    /// Remove an inbound listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        if self.shared.state.advance(ChannelState::Closed) {
            log::info!("[Channel] Closing");
            let _ = self.shared.outgoing.send(Outgoing::Close);
        }
    }
}

impl Drop for PersistentChannel {
    fn drop(&mut self) {
        self.close();
        self.reader.abort();
    }
}

/// Drain the outgoing queue into the socket until close or failure.
async fn run_writer(
    mut writer: WsWriter,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    state: Arc<SharedChannelState>,
) {
    while let Some(item) = outgoing_rx.recv().await {
        let result = match item {
            Outgoing::Text(text) => writer.send_text(text).await,
            Outgoing::Binary(data) => writer.send_binary(data).await,
            Outgoing::Pong(data) => writer.send_pong(data).await,
            Outgoing::Close => {
                if let Err(e) = writer.close().await {
                    log::debug!("[Channel] Close frame not delivered: {}", e);
                }
                break;
            }
            Outgoing::Shutdown => break,
        };

        if let Err(e) = result {
            log::warn!("[Channel] Error: {}", e);
            state.advance(ChannelState::Closed);
            break;
        }
    }
    log::debug!("[Channel] Writer stopped");
}

/// Read frames in arrival order and dispatch them to listeners.
async fn run_reader(
    mut reader: WsReader,
    listeners: Arc<Listeners>,
    state: Arc<SharedChannelState>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
) {
    while let Some(msg) = reader.recv().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                log::debug!(
                    "[Channel] Message received: {}",
                    log_preview(&text, LISTENER_LOG_PREVIEW)
                );
                listeners.dispatch(&text);
            }
            Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => {
                    log::debug!(
                        "[Channel] Message received (binary): {}",
                        log_preview(&text, LISTENER_LOG_PREVIEW)
                    );
                    listeners.dispatch(&text);
                }
                Err(e) => {
                    log::warn!(
                        "[Channel] Dropping non-UTF-8 binary frame ({} bytes)",
                        e.as_bytes().len()
                    );
                }
            },
            Ok(WsMessage::Ping(data)) => {
                let _ = outgoing.send(Outgoing::Pong(data));
            }
            Ok(WsMessage::Pong(_)) => {}
            Ok(WsMessage::Close { code, reason }) => {
                log::info!("[Channel] Closed by server (code={}, reason={:?})", code, reason);
                break;
            }
            Err(e) => {
                log::warn!("[Channel] Error: {}", e);
                break;
            }
        }
    }

    if state.advance(ChannelState::Closed) {
        log::info!("[Channel] Connection lost; no reconnect will be attempted");
    }
    let _ = outgoing.send(Outgoing::Shutdown);
}
