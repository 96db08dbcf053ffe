//! Event types for the sohbet wire protocol.
//!
//! The wire format is one JSON object per WebSocket text frame. Field names
//! (`gonderen`, `alici`, `icerik`, ...) are part of the protocol and must not
//! change. Inbound frames are classified into [`ClientEvent`] variants by the
//! codec; outbound frames are built from [`ServerEvent`].

use serde::Serialize;

/// Typing indicator state relayed between clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypingState {
    /// The user started composing a message (`yaziyor`).
    Started,
    /// The user stopped composing (`durdu`).
    Stopped,
}

impl TypingState {
    /// The wire tag for this state.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            TypingState::Started => "yaziyor",
            TypingState::Stopped => "durdu",
        }
    }
}

/// A classified inbound event.
///
/// The client-supplied `gonderen` field is dropped during decoding; the
/// authenticated session identity is the only trusted sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A chat message. `recipient` of `None` means broadcast to everyone.
    Chat {
        recipient: Option<String>,
        content: String,
    },
    /// A transient typing-state signal. Never persisted.
    Typing(TypingState),
}

/// A chat message ready for delivery.
///
/// Carries no `type` tag on the wire; clients recognize chat frames by the
/// absence of one. History replay uses the same shape without
/// `zaman_etiketi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatDelivery {
    pub gonderen: String,
    pub alici: Option<String>,
    pub icerik: String,
    /// ISO-8601 timestamp in the display timezone.
    pub zaman: String,
    /// Locale-formatted `DD.MM.YYYY HH:MM:SS` label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zaman_etiketi: Option<String>,
}

/// Online/offline presence change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    pub kullanici: String,
    pub online: bool,
}

/// Snapshot of currently-online usernames, sent once at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusListEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    pub kullanicilar: Vec<String>,
}

/// Typing-state relay to other connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    pub gonderen: String,
}

/// Error notice to a single client (store failures only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    pub mesaj: String,
}

/// An outbound event, one JSON object per frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerEvent {
    Chat(ChatDelivery),
    Status(StatusEvent),
    StatusList(StatusListEvent),
    Typing(TypingEvent),
    Error(ErrorEvent),
}

impl ServerEvent {
    /// Create a presence status event.
    #[must_use]
    pub fn status(username: impl Into<String>, online: bool) -> Self {
        ServerEvent::Status(StatusEvent {
            kind: "status",
            kullanici: username.into(),
            online,
        })
    }

    /// Create the initial online-usernames snapshot.
    #[must_use]
    pub fn status_list(usernames: Vec<String>) -> Self {
        ServerEvent::StatusList(StatusListEvent {
            kind: "status-list",
            kullanicilar: usernames,
        })
    }

    /// Create a typing relay event.
    #[must_use]
    pub fn typing(state: TypingState, username: impl Into<String>) -> Self {
        ServerEvent::Typing(TypingEvent {
            kind: state.tag(),
            gonderen: username.into(),
        })
    }

    /// Create an error notice.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorEvent {
            kind: "hata",
            mesaj: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_tags() {
        assert_eq!(TypingState::Started.tag(), "yaziyor");
        assert_eq!(TypingState::Stopped.tag(), "durdu");
    }

    #[test]
    fn test_status_event_shape() {
        let event = ServerEvent::status("ayse", true);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["kullanici"], "ayse");
        assert_eq!(json["online"], true);
    }

    #[test]
    fn test_status_list_shape() {
        let event = ServerEvent::status_list(vec!["ayse".into(), "mehmet".into()]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status-list");
        assert_eq!(json["kullanicilar"][0], "ayse");
        assert_eq!(json["kullanicilar"][1], "mehmet");
    }

    #[test]
    fn test_typing_event_uses_state_tag() {
        let event = ServerEvent::typing(TypingState::Stopped, "ayse");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "durdu");
        assert_eq!(json["gonderen"], "ayse");
    }

    #[test]
    fn test_chat_delivery_has_no_type_tag() {
        let delivery = ChatDelivery {
            gonderen: "ayse".into(),
            alici: None,
            icerik: "selam".into(),
            zaman: "2024-03-01T12:00:00+03:00".into(),
            zaman_etiketi: None,
        };
        let json = serde_json::to_value(ServerEvent::Chat(delivery)).unwrap();
        assert!(json.get("type").is_none());
        assert_eq!(json["alici"], serde_json::Value::Null);
        assert!(json.get("zaman_etiketi").is_none());
    }
}
