//! # sohbet-core
//!
//! Connection registry, message routing, and persistence for the sohbet
//! messaging relay.
//!
//! This crate provides the relay's stateful core:
//!
//! - **ConnectionRegistry** - who is online, one connection per username
//! - **MessageStore** - durable append-only log with queryable history
//! - **PresenceBroadcaster** - online/offline and typing fan-out
//! - **MessageRouter** - persist-then-deliver routing
//! - **Session** - per-connection bootstrap and lifecycle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│   Router    │────▶│    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │  Presence   │────▶│  Registry   │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! The transport (see `sohbet-server`) authenticates a connection, hands
//! the session a verified username and an outbound queue, and pumps decoded
//! events into it. Tasks share only the registry and the store.

pub mod presence;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;

pub use presence::PresenceBroadcaster;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, DeliveryError, Outbound};
pub use router::{MessageRouter, RouterError};
pub use session::{Session, SessionError, SessionState, DEFAULT_REPLAY_LIMIT};
pub use store::{Message, MessageStore, StoreError};
