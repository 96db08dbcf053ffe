//! Connection registry for sohbet.
//!
//! The registry is the single source of truth for "who is online": a
//! process-wide map from username to the live connection's outbound queue.
//! It is the only mutable structure shared between connection tasks.
//!
//! Concurrency contract: mutations are per-entry atomic (a register is a
//! single-key insert, an unregister a single-key conditional removal), so a
//! partially-registered connection is never visible. Fan-out callers use a
//! snapshot-then-iterate discipline via [`ConnectionRegistry::handles`] so
//! iteration never races entry insertion or removal.

use dashmap::DashMap;
use sohbet_protocol::{codec, ServerEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// A unique connection identifier.
pub type ConnectionId = u64;

/// Atomic counter so every connection gets a distinct id, even for the same
/// username across rapid reconnects.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Control messages sent to a connection's transport task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A pre-encoded event payload, shared across fan-out targets.
    Frame(Arc<str>),
    /// The transport should close: this session was superseded by a newer
    /// connection for the same username. No application-level message is
    /// delivered.
    Close,
}

/// A single target's transport is gone; other targets are unaffected.
#[derive(Debug, Error)]
#[error("connection for {username} is gone")]
pub struct DeliveryError {
    pub username: String,
}

/// Handle to a live connection's outbound queue.
///
/// Cloning is cheap; all clones feed the same transport task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    username: String,
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle around a connection's outbound queue, assigning a
    /// fresh connection id.
    #[must_use]
    pub fn new(username: impl Into<String>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            username: username.into(),
            id: next_connection_id(),
            tx,
        }
    }

    /// The username this connection belongs to.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The unique id of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue a pre-encoded frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport task has gone away.
    pub fn send_frame(&self, frame: Arc<str>) -> Result<(), DeliveryError> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| DeliveryError {
                username: self.username.clone(),
            })
    }

    /// Encode an event and enqueue it.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the transport task has gone
    /// away.
    pub fn send_event(&self, event: &ServerEvent) -> Result<(), DeliveryError> {
        let frame = codec::encode(event).map_err(|_| DeliveryError {
            username: self.username.clone(),
        })?;
        self.send_frame(frame.into())
    }

    /// Ask the transport to close. Best-effort: a queue that is already gone
    /// means the transport is closing anyway.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Process-wide mapping from username to the active connection.
///
/// At most one connection per username: registering a second connection for
/// a username force-closes the first (newest wins).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, superseding any previous one for the same
    /// username. The superseded transport is notified via closure, not via
    /// an application-level message.
    pub fn register(&self, handle: ConnectionHandle) {
        let username = handle.username().to_string();
        if let Some(previous) = self.connections.insert(username.clone(), handle) {
            debug!(user = %username, superseded = previous.id(), "superseding existing connection");
            previous.close();
        }
    }

    /// Remove the mapping, but only if `id` still identifies the registered
    /// connection: a stale disconnect from a superseded connection must not
    /// evict the newer one. Idempotent.
    ///
    /// Returns `true` if an entry was actually removed.
    pub fn unregister(&self, username: &str, id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(username, |_, handle| handle.id() == id)
            .is_some();
        if removed {
            debug!(user = %username, connection = id, "unregistered");
        }
        removed
    }

    /// Usernames of all currently-registered connections.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Look up the active connection for a username.
    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<ConnectionHandle> {
        self.connections.get(username).map(|e| e.value().clone())
    }

    /// Snapshot of all connection handles, for fan-out.
    #[must_use]
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no one is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &ConnectionRegistry, username: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(username, tx);
        registry.register(handle.clone());
        (handle, rx)
    }

    #[test]
    fn test_register_lookup_snapshot() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connect(&registry, "ayse");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("ayse").unwrap().id(), handle.id());
        assert!(registry.lookup("mehmet").is_none());
        assert_eq!(registry.snapshot(), vec!["ayse".to_string()]);
    }

    #[test]
    fn test_reregister_supersedes_and_closes_old() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = connect(&registry, "ayse");
        let (second, _second_rx) = connect(&registry, "ayse");

        // Exactly one entry, and it is the newer connection.
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("ayse").unwrap().id(), second.id());
        assert_ne!(first.id(), second.id());

        // The superseded transport was told to close, with no app-level event.
        assert!(matches!(first_rx.try_recv(), Ok(Outbound::Close)));
    }

    #[test]
    fn test_stale_unregister_is_noop() {
        let registry = ConnectionRegistry::new();
        let (first, _first_rx) = connect(&registry, "ayse");
        let (second, _second_rx) = connect(&registry, "ayse");

        // The superseded connection's disconnect must not evict the newer one.
        assert!(!registry.unregister("ayse", first.id()));
        assert_eq!(registry.lookup("ayse").unwrap().id(), second.id());

        // The current connection's disconnect does, and is idempotent.
        assert!(registry.unregister("ayse", second.id()));
        assert!(!registry.unregister("ayse", second.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_send_frame_to_gone_transport() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new("ayse", tx);
        drop(rx);

        let err = handle.send_frame("{}".into()).unwrap_err();
        assert_eq!(err.username, "ayse");
    }

    #[test]
    fn test_send_event_reaches_transport() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new("ayse", tx);

        handle.send_event(&ServerEvent::status("mehmet", true)).unwrap();
        match rx.try_recv() {
            Ok(Outbound::Frame(frame)) => {
                let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
                assert_eq!(json["type"], "status");
            }
            other => panic!("Expected frame, got {:?}", other),
        }
    }
}
