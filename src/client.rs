//! Client bootstrap context.
//!
//! [`Client`] is built once at startup and owns everything the transport
//! layer needs: the configuration, the shared [`SessionStore`], and the
//! [`Pipeline`]. There are no process-wide singletons; pass the client (or
//! its session store) to whatever needs it.

use std::sync::Arc;

use crate::channel::PersistentChannel;
use crate::chat::ChatSession;
use crate::config::Config;
use crate::error::ClientError;
use crate::notify::{LogoutHandler, Notifier};
use crate::operation::Operation;
use crate::pipeline::{Dispatched, Pipeline, StreamId};
use crate::session::{MemberRef, SessionStore};
use crate::transport::{HttpTransport, RequestTransport, TransportError};

/// Transport-layer context.
pub struct Client {
    config: Config,
    session: Arc<SessionStore>,
    pipeline: Pipeline,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("http_url", &self.config.http_url)
            .field("channel_url", &self.config.channel_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client that sends requests over HTTP to `config.http_url`.
    ///
    /// A token present in `config` is installed as the session credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        config: Config,
        notifier: Arc<dyn Notifier>,
        logout: Arc<dyn LogoutHandler>,
    ) -> Result<Self, ClientError> {
        let http = HttpTransport::new(config.http_url.clone())?;
        Ok(Self::with_transport(config, Arc::new(http), notifier, logout))
    }

    /// Build a client around a custom request transport.
    pub fn with_transport(
        config: Config,
        request: Arc<dyn RequestTransport>,
        notifier: Arc<dyn Notifier>,
        logout: Arc<dyn LogoutHandler>,
    ) -> Self {
        let session = Arc::new(SessionStore::new());
        if let Some(token) = config.token() {
            session.login(token, None);
        }
        let pipeline = Pipeline::new(
            Arc::clone(&session),
            request,
            Arc::clone(&notifier),
            logout,
        );
        Self {
            config,
            session,
            pipeline,
            notifier,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared session store.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Install a credential. Takes effect on the next operation.
    pub fn login(&self, token: impl Into<String>, identity: Option<MemberRef>) {
        self.session.login(token, identity);
    }

    /// Clear the session and close the channel.
    ///
    /// Returns `false` if there was nothing to clear.
    pub fn logout(&self) -> bool {
        self.session.clear()
    }

    /// Open a fresh persistent channel with the current token and install it.
    ///
    /// Any previous channel is closed. A handshake refused with 401/403 is
    /// handled as an authentication failure (the session is cleared). If the
    /// session is cleared or switches token while the handshake is in
    /// flight, the new channel is closed instead of installed.
    ///
    /// # Errors
    ///
    /// Returns the classified handshake failure, or an error describing the
    /// session change that discarded the channel.
    pub async fn open_channel(&self) -> Result<(), ClientError> {
        let session = self.session.snapshot();
        match PersistentChannel::connect(&self.config.channel_url, session.bearer_token()).await {
            Ok(channel) => {
                if self.session.install_channel_at(session.epoch(), channel) {
                    return Ok(());
                }
                if self.session.snapshot().is_authenticated() {
                    Err(ClientError::Network {
                        status: None,
                        message: "Session changed while the channel was connecting".to_string(),
                    })
                } else {
                    Err(ClientError::Authentication(
                        "Session ended while the channel was connecting".to_string(),
                    ))
                }
            }
            Err(e) => Err(self.pipeline.interceptor().on_transport_error(
                "channel handshake",
                &session,
                TransportError::from(e),
            )),
        }
    }

    /// Execute an operation through the pipeline.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::execute`].
    pub async fn execute(&self, op: Operation) -> Result<Dispatched, ClientError> {
        self.pipeline.execute(op).await
    }

    /// Stop a streaming operation.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::cancel_stream`].
    pub fn cancel_stream(&self, id: StreamId) -> Result<(), ClientError> {
        self.pipeline.cancel_stream(id)
    }

    /// Attach a chat session to the current channel.
    ///
    /// # Errors
    ///
    /// Returns a network error if no channel is open.
    pub fn chat(&self) -> Result<ChatSession, ClientError> {
        let composing_for = self.config.composing_indicator();
        self.session
            .with_channel(|channel| {
                ChatSession::attach(channel, Arc::clone(&self.notifier), composing_for)
            })
            .ok_or(ClientError::Network {
                status: None,
                message: "No persistent channel is open".to_string(),
            })
    }
}
