//! # sohbet-protocol
//!
//! Wire protocol definitions for the sohbet messaging relay.
//!
//! The protocol is JSON text frames over a persistent WebSocket, one event
//! object per frame.
//!
//! ## Event Types
//!
//! - `mesaj` (default/omitted tag) - chat message, direct or broadcast
//! - `yaziyor` / `durdu` - transient typing-state signals
//! - `status` / `status-list` - presence change and the bootstrap snapshot
//! - `hata` - store-failure notice to the sender
//!
//! ## Example
//!
//! ```rust
//! use sohbet_protocol::{codec, ClientEvent};
//!
//! let event = codec::decode_client(r#"{"alici":null,"icerik":"selam"}"#).unwrap();
//! assert!(matches!(event, ClientEvent::Chat { .. }));
//! ```

pub mod codec;
pub mod events;
pub mod time;

pub use codec::{decode_client, encode, ProtocolError};
pub use events::{ChatDelivery, ClientEvent, ServerEvent, TypingState};
