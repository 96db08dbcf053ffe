//! Per-connection session lifecycle.
//!
//! A session owns one user's registered connection from handshake to
//! teardown. The transport hands it a verified username and the outbound
//! queue; the session registers the connection, runs the bootstrap sequence,
//! accepts classified inbound events while active, and tears down exactly
//! once on close.

use crate::presence::PresenceBroadcaster;
use crate::registry::{ConnectionHandle, ConnectionRegistry, DeliveryError, Outbound};
use crate::router::MessageRouter;
use crate::store::{MessageStore, StoreError};
use sohbet_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default number of messages replayed on connect.
pub const DEFAULT_REPLAY_LIMIT: u32 = 50;

/// Notice sent to the sender when their message could not be persisted.
const STORE_FAILURE_NOTICE: &str = "mesaj kaydedilemedi";

/// Connection lifecycle states.
///
/// Inbound chat/typing events are accepted only in `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Bootstrapped,
    Active,
    Closing,
    Closed,
}

/// Session errors. Anything here aborts the bootstrap; the transport should
/// close the connection.
#[derive(Debug, Error)]
pub enum SessionError {
    /// History could not be read for replay.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The connection went away mid-bootstrap.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// One user's registered connection, from bootstrap to teardown.
pub struct Session {
    username: String,
    handle: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
    store: MessageStore,
    presence: PresenceBroadcaster,
    router: MessageRouter,
    replay_limit: u32,
    state: SessionState,
}

impl Session {
    /// Register a verified user's connection, superseding any previous
    /// connection for the same username. The session starts in
    /// `Connecting`; call [`Session::bootstrap`] before feeding it events.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        username: impl Into<String>,
        tx: mpsc::UnboundedSender<Outbound>,
        registry: Arc<ConnectionRegistry>,
        store: MessageStore,
        presence: PresenceBroadcaster,
        router: MessageRouter,
        replay_limit: u32,
    ) -> Self {
        let username = username.into();
        let handle = ConnectionHandle::new(username.clone(), tx);
        registry.register(handle.clone());
        info!(user = %username, connection = handle.id(), "connected");

        Self {
            username,
            handle,
            registry,
            store,
            presence,
            router,
            replay_limit,
            state: SessionState::Connecting,
        }
    }

    /// The verified username this session belongs to.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the bootstrap sequence: send the online-usernames snapshot to
    /// this connection, announce `online` to everyone else, then replay
    /// recent history to this connection only. Both complete before the
    /// receive loop may start feeding events.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be read or this connection went
    /// away; the caller should close the session.
    pub async fn bootstrap(&mut self) -> Result<(), SessionError> {
        debug_assert_eq!(self.state, SessionState::Connecting);

        self.handle
            .send_event(&ServerEvent::status_list(self.registry.snapshot()))?;
        self.presence.announce(&self.username, true);
        self.state = SessionState::Bootstrapped;

        let history = self.store.history_for(&self.username, self.replay_limit).await?;
        debug!(user = %self.username, replayed = history.len(), "replaying history");
        for message in &history {
            // Replay goes to the new connection only, without the label.
            self.handle
                .send_event(&self.router.delivery_event(message, false))?;
        }

        self.state = SessionState::Active;
        Ok(())
    }

    /// Handle one classified inbound event. Events arriving outside the
    /// `Active` state are dropped.
    ///
    /// The authenticated session username is the sender of every chat
    /// event, regardless of what the client put on the wire. A persistence
    /// failure is reported to this sender alone; the session keeps serving.
    pub async fn handle_event(&mut self, event: ClientEvent) {
        if self.state != SessionState::Active {
            warn!(user = %self.username, state = ?self.state, "dropping event outside active state");
            return;
        }

        match event {
            ClientEvent::Chat { recipient, content } => {
                if let Err(err) = self
                    .router
                    .route(&self.username, recipient.as_deref(), &content)
                    .await
                {
                    warn!(user = %self.username, error = %err, "message not persisted");
                    // Best-effort notice; if the sender is gone too, nothing to do.
                    let _ = self.handle.send_event(&ServerEvent::error(STORE_FAILURE_NOTICE));
                }
            }
            ClientEvent::Typing(state) => {
                self.presence.relay_typing(&self.username, state);
            }
        }
    }

    /// Tear the session down, exactly once. Unregisters this connection
    /// (stale-safe: a superseded session leaves the newer registration
    /// untouched) and announces `offline` only if this connection was still
    /// the registered one. Idempotent.
    pub fn close(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.state = SessionState::Closing;

        if self.registry.unregister(&self.username, self.handle.id()) {
            self.presence.announce(&self.username, false);
            info!(user = %self.username, "disconnected");
        } else {
            debug!(user = %self.username, "stale disconnect, newer connection stays online");
        }

        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
