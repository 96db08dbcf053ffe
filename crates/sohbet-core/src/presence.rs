//! Presence broadcasting for sohbet.
//!
//! Presence covers two kinds of transient, unpersisted signals: online/offline
//! status changes and typing indicators. Both fan out to every *other*
//! registered connection, best-effort: a dead target is skipped, never
//! retried, and never surfaced to the triggering user. Receivers must
//! tolerate duplicate or out-of-order delivery.

use crate::registry::ConnectionRegistry;
use sohbet_protocol::{codec, ServerEvent, TypingState};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fans presence and typing events out to everyone except the origin.
#[derive(Debug, Clone)]
pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceBroadcaster {
    /// Create a broadcaster over the shared registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Announce an online/offline change to every other connection.
    pub fn announce(&self, username: &str, online: bool) {
        debug!(user = %username, online, "announcing presence change");
        self.fan_out(username, &ServerEvent::status(username, online));
    }

    /// Relay a typing-state signal to every other connection. No
    /// persistence, no acknowledgement.
    pub fn relay_typing(&self, username: &str, state: TypingState) {
        self.fan_out(username, &ServerEvent::typing(state, username));
    }

    /// Encode once, then send to every registered connection except
    /// `origin`. Snapshot-then-iterate: the target set is fixed before the
    /// first send.
    fn fan_out(&self, origin: &str, event: &ServerEvent) {
        let frame: Arc<str> = match codec::encode(event) {
            Ok(encoded) => encoded.into(),
            Err(err) => {
                warn!(error = %err, "failed to encode presence event");
                return;
            }
        };

        for handle in self.registry.handles() {
            if handle.username() == origin {
                continue;
            }
            if let Err(err) = handle.send_frame(Arc::clone(&frame)) {
                debug!(target = %err.username, "skipping gone connection");
            }
        }
    }
}
