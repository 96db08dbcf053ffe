//! Message routing for sohbet.
//!
//! The router is the persist-then-deliver pipeline: every inbound chat event
//! is durably appended to the store first, then fanned out to its delivery
//! set. A message that failed to persist is never delivered to anyone.

use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::store::{Message, MessageStore, StoreError};
use chrono::FixedOffset;
use sohbet_protocol::{codec, time, ChatDelivery, ProtocolError, ServerEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Router errors.
///
/// Per-target delivery failures are absorbed internally; only persistence
/// and encoding failures surface, and those abort delivery entirely.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Persistence failed; nothing was delivered.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The persisted record could not be encoded; nothing was delivered.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Routes chat events: persist, compute the delivery set, fan out.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    store: MessageStore,
    registry: Arc<ConnectionRegistry>,
    display_offset: FixedOffset,
}

impl MessageRouter {
    /// Create a router over the shared store and registry. `display_offset`
    /// is the fixed timezone used to render `zaman` / `zaman_etiketi`.
    #[must_use]
    pub fn new(
        store: MessageStore,
        registry: Arc<ConnectionRegistry>,
        display_offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            registry,
            display_offset,
        }
    }

    /// Persist a chat event, then deliver it.
    ///
    /// Direct messages go to sender and recipient (a set: a self-addressed
    /// message is delivered once). Broadcasts go to every registered
    /// connection, sender included, so clients get their own message echoed
    /// back with the server-assigned timestamp. Targets are fixed by a
    /// registry snapshot taken after persistence; a connection registered
    /// later sees the message only through history.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence or encoding failed, in which case no
    /// delivery was attempted. Per-target transport failures are logged and
    /// skipped.
    pub async fn route(
        &self,
        sender: &str,
        recipient: Option<&str>,
        content: &str,
    ) -> Result<Message, RouterError> {
        let message = self.store.append(sender, recipient, content).await?;

        let event = self.delivery_event(&message, true);
        let frame: Arc<str> = codec::encode(&event)?.into();

        let targets = match message.recipient.as_deref() {
            Some(recipient) => self.direct_targets(&message.sender, recipient),
            None => self.registry.handles(),
        };

        let mut delivered = 0;
        for handle in &targets {
            match handle.send_frame(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(err) => debug!(target = %err.username, "skipping gone connection"),
            }
        }
        debug!(
            id = message.id,
            sender = %message.sender,
            broadcast = message.is_broadcast(),
            delivered,
            "message routed"
        );

        Ok(message)
    }

    /// Build the outbound chat-delivery event for a persisted record.
    /// History replay passes `with_label = false`; live delivery includes
    /// the `zaman_etiketi` label.
    #[must_use]
    pub fn delivery_event(&self, message: &Message, with_label: bool) -> ServerEvent {
        ServerEvent::Chat(ChatDelivery {
            gonderen: message.sender.clone(),
            alici: message.recipient.clone(),
            icerik: message.content.clone(),
            zaman: time::format_iso(message.sent_at, self.display_offset),
            zaman_etiketi: with_label
                .then(|| time::format_label(message.sent_at, self.display_offset)),
        })
    }

    /// Delivery set for a direct message: `{sender, recipient}` among the
    /// currently registered connections.
    fn direct_targets(&self, sender: &str, recipient: &str) -> Vec<ConnectionHandle> {
        let mut targets = Vec::with_capacity(2);
        if let Some(handle) = self.registry.lookup(sender) {
            targets.push(handle);
        }
        if recipient != sender {
            if let Some(handle) = self.registry.lookup(recipient) {
                targets.push(handle);
            }
        }
        if targets.is_empty() {
            warn!(sender, recipient, "direct message with no online target");
        }
        targets
    }
}
