//! Codec for encoding and decoding sohbet frames.
//!
//! Frames are JSON text, one object per WebSocket text message. Inbound
//! frames are decoded into a raw shape first, then classified into a
//! [`ClientEvent`] by tag; anything that fails classification is a
//! [`ProtocolError::Malformed`] and is dropped by the caller without
//! affecting the connection.

use serde::Deserialize;
use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent, TypingState};

/// Maximum accepted inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Frame parsed as JSON but is not a valid event.
    #[error("Malformed frame: {0}")]
    Malformed(&'static str),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw inbound frame before classification.
///
/// Unknown fields are ignored, including any client-supplied `gonderen`;
/// the authenticated session identity is the only trusted sender.
#[derive(Debug, Deserialize)]
struct RawFrame {
    /// Frame tag; absent means a chat message (`mesaj`).
    #[serde(rename = "type")]
    kind: Option<String>,
    alici: Option<String>,
    icerik: Option<String>,
}

/// Decode and classify an inbound client frame.
///
/// # Errors
///
/// Returns an error if the frame is oversized, not valid JSON, carries an
/// unknown tag, or is a chat frame without content.
pub fn decode_client(text: &str) -> Result<ClientEvent, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    let raw: RawFrame = serde_json::from_str(text)?;

    match raw.kind.as_deref() {
        None | Some("mesaj") => {
            let content = raw.icerik.unwrap_or_default();
            if content.is_empty() {
                return Err(ProtocolError::Malformed("icerik must not be empty"));
            }
            // An empty recipient means broadcast, same as an absent one.
            let recipient = raw.alici.filter(|alici| !alici.is_empty());
            Ok(ClientEvent::Chat { recipient, content })
        }
        Some("yaziyor") => Ok(ClientEvent::Typing(TypingState::Started)),
        Some("durdu") => Ok(ClientEvent::Typing(TypingState::Stopped)),
        Some(_) => Err(ProtocolError::Malformed("unknown frame type")),
    }
}

/// Encode an outbound event as a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chat_default_type() {
        let event =
            decode_client(r#"{"gonderen":"ayse","alici":"mehmet","icerik":"selam"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Chat {
                recipient: Some("mehmet".into()),
                content: "selam".into(),
            }
        );
    }

    #[test]
    fn test_decode_chat_explicit_type() {
        let event = decode_client(r#"{"type":"mesaj","alici":null,"icerik":"herkese"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Chat {
                recipient: None,
                content: "herkese".into(),
            }
        );
    }

    #[test]
    fn test_decode_empty_recipient_is_broadcast() {
        let event = decode_client(r#"{"alici":"","icerik":"selam"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Chat {
                recipient: None,
                content: "selam".into(),
            }
        );
    }

    #[test]
    fn test_decode_typing_states() {
        assert_eq!(
            decode_client(r#"{"type":"yaziyor"}"#).unwrap(),
            ClientEvent::Typing(TypingState::Started)
        );
        assert_eq!(
            decode_client(r#"{"type":"durdu"}"#).unwrap(),
            ClientEvent::Typing(TypingState::Stopped)
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        match decode_client(r#"{"type":"selamla"}"#) {
            Err(ProtocolError::Malformed(_)) => {}
            other => panic!("Expected Malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_or_empty_content() {
        assert!(matches!(
            decode_client(r#"{"alici":"mehmet"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_client(r#"{"alici":"mehmet","icerik":""}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(matches!(
            decode_client("not json"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_decode_oversized_frame() {
        let huge = format!(r#"{{"icerik":"{}"}}"#, "a".repeat(MAX_FRAME_SIZE + 1));
        match decode_client(&huge) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unicode_content() {
        let event = decode_client(r#"{"icerik":"günaydın ☀️"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Chat {
                recipient: None,
                content: "günaydın ☀️".into(),
            }
        );
    }

    #[test]
    fn test_encode_status_roundtrip_shape() {
        let encoded = encode(&ServerEvent::status("ayse", false)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["kullanici"], "ayse");
        assert_eq!(json["online"], false);
    }

    #[test]
    fn test_encode_error_event() {
        let encoded = encode(&ServerEvent::error("mesaj kaydedilemedi")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["type"], "hata");
        assert_eq!(json["mesaj"], "mesaj kaydedilemedi");
    }
}
