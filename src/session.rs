//! Session state and the single owner of the persistent channel.
//!
//! [`SessionStore`] is shared (`Arc`) between the pipeline, the client
//! bootstrap, and the presentation layer. It holds the credential, the
//! authenticated identity, and the one live [`PersistentChannel`].
//!
//! Every login with a new token and every effective clear bumps an epoch
//! counter. Failures observed for an operation sent under an older epoch
//! cannot clear a newer session, and a channel opened under an older epoch is
//! never installed.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::{ChannelError, ChannelState, PersistentChannel};

/// Opaque reference to a member (user) as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberRef(Map<String, Value>);

impl MemberRef {
    /// Wrap raw member fields.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Member id (`id` or `_id`, string or number).
    pub fn id(&self) -> Option<String> {
        ["id", "_id"]
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// Name to show for this member (`name`, `username`, or `email`).
    pub fn display_name(&self) -> Option<&str> {
        ["name", "username", "email"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
    }

    /// Raw field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Snapshot of the session credential and identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Bearer token.
    pub token: Option<String>,
    /// Authenticated identity.
    pub identity: Option<MemberRef>,
    epoch: u64,
}

impl Session {
    /// Session carrying only a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Token to present, ignoring empty strings.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Whether a usable token is present.
    pub fn is_authenticated(&self) -> bool {
        self.bearer_token().is_some()
    }

    /// Generation this snapshot was taken at.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn is_empty(&self) -> bool {
        self.token.is_none() && self.identity.is_none()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    session: Session,
    channel: Option<PersistentChannel>,
}

/// Shared session store.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<StoreInner>,
}

impl SessionStore {
    /// Create an empty (logged-out) store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current session.
    pub fn snapshot(&self) -> Session {
        self.lock().session.clone()
    }

    /// Current token.
    pub fn token(&self) -> Option<String> {
        self.lock().session.token.clone()
    }

    /// Current identity.
    pub fn identity(&self) -> Option<MemberRef> {
        self.lock().session.identity.clone()
    }

    /// Install a credential and identity.
    ///
    /// A channel opened under a different token is closed. Re-installing the
    /// current token keeps the epoch, so failures of operations already in
    /// flight still clear it.
    pub fn login(&self, token: impl Into<String>, identity: Option<MemberRef>) {
        let token = token.into();
        let stale = {
            let mut inner = self.lock();
            let stale = if inner.session.token.as_deref() == Some(token.as_str()) {
                None
            } else {
                inner.session.epoch += 1;
                inner.channel.take()
            };
            inner.session.token = Some(token);
            inner.session.identity = identity;
            stale
        };
        log::info!("[Session] Logged in");
        drop(stale);
    }

    /// Replace the identity without touching the token.
    pub fn set_identity(&self, identity: Option<MemberRef>) {
        self.lock().session.identity = identity;
    }

    /// Clear the credential, identity, and channel.
    ///
    /// Returns `true` only if something was cleared; a second call is a
    /// no-op that returns `false`.
    pub fn clear(&self) -> bool {
        let (cleared, channel) = {
            let mut inner = self.lock();
            Self::clear_locked(&mut inner)
        };
        drop(channel);
        cleared
    }

    /// Like [`Self::clear`], but only if the session is still at `epoch`.
    pub fn clear_epoch(&self, epoch: u64) -> bool {
        let (cleared, channel) = {
            let mut inner = self.lock();
            if inner.session.epoch != epoch {
                log::debug!(
                    "[Session] Ignoring clear for epoch {} (current {})",
                    epoch,
                    inner.session.epoch
                );
                return false;
            }
            Self::clear_locked(&mut inner)
        };
        drop(channel);
        cleared
    }

    fn clear_locked(inner: &mut StoreInner) -> (bool, Option<PersistentChannel>) {
        let channel = inner.channel.take();
        if inner.session.is_empty() && channel.is_none() {
            return (false, None);
        }
        inner.session.token = None;
        inner.session.identity = None;
        inner.session.epoch += 1;
        log::info!("[Session] Cleared");
        (true, channel)
    }

    /// Make `channel` the session's channel if the session is still at
    /// `epoch`, closing any previous one.
    ///
    /// Returns `false` and closes `channel` when the session was cleared or
    /// switched to another token after `epoch` was taken.
    pub fn install_channel_at(&self, epoch: u64, channel: PersistentChannel) -> bool {
        let (installed, dropped) = {
            let mut inner = self.lock();
            if inner.session.epoch == epoch {
                let previous = inner.channel.replace(channel);
                if previous.is_some() {
                    log::debug!("[Session] Replacing persistent channel");
                }
                (true, previous)
            } else {
                log::info!(
                    "[Session] Discarding channel opened at epoch {} (current {})",
                    epoch,
                    inner.session.epoch
                );
                (false, Some(channel))
            }
        };
        drop(dropped);
        installed
    }

    /// Close and drop the channel. Returns `false` if there was none.
    pub fn close_channel(&self) -> bool {
        let channel = self.lock().channel.take();
        channel.is_some()
    }

    /// State of the current channel, if any.
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.lock().channel.as_ref().map(PersistentChannel::state)
    }

    /// Run `f` with the current channel.
    ///
    /// `f` runs with the store locked and must not call back into it.
    pub fn with_channel<R>(&self, f: impl FnOnce(&PersistentChannel) -> R) -> Option<R> {
        self.lock().channel.as_ref().map(f)
    }

    /// Queue a frame on the current channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when no channel is installed.
    pub fn send_frame(&self, bytes: Vec<u8>) -> Result<(), ChannelError> {
        self.with_channel(|channel| channel.send(bytes))
            .unwrap_or(Err(ChannelError::Closed))
    }
}
