//! Text codec for the link's message frames
//!
//! Inbound frames are JSON objects:
//! ```text
//! { "type": "<kind>", "data": <any JSON, optional> }
//! ```
//!
//! The outbound heartbeat is the bare text `ping`, not a JSON envelope.

use thiserror::Error;

use crate::Envelope;

/// Maximum frame size (10 MB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Heartbeat frame sent by the client
pub const PING_FRAME: &str = "ping";

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("Envelope has an empty type")]
    EmptyKind,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a text frame into an envelope
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(text.len()));
    }

    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.kind.is_empty() {
        return Err(CodecError::EmptyKind);
    }

    Ok(envelope)
}

/// Encode an envelope into a text frame
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    if envelope.kind.is_empty() {
        return Err(CodecError::EmptyKind);
    }

    let text = serde_json::to_string(envelope)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Whether a raw text frame is the client heartbeat
pub fn is_ping(text: &str) -> bool {
    text == PING_FRAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds;
    use serde_json::json;

    #[test]
    fn test_decode_envelope() {
        let envelope =
            decode(r#"{"type":"world_update","data":{"tick":1}}"#).expect("decode failed");
        assert_eq!(envelope.kind, kinds::WORLD_UPDATE);
        assert_eq!(envelope.data, json!({"tick": 1}));
    }

    #[test]
    fn test_decode_without_data() {
        let envelope = decode(r#"{"type":"pong"}"#).expect("decode failed");
        assert!(envelope.is_pong());
        assert!(envelope.data.is_null());
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let envelope = decode(r#"{"type":"log","data":"hi","timestamp":"2024-01-01T00:00:00"}"#)
            .expect("decode failed");
        assert_eq!(envelope.kind, kinds::LOG);
        assert_eq!(envelope.data, json!("hi"));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode("not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode(r#"{"data":1}"#), Err(CodecError::Json(_))));
        assert!(matches!(decode(r#"{"type":7}"#), Err(CodecError::Json(_))));
        assert!(matches!(decode(r#"{"type":""}"#), Err(CodecError::EmptyKind)));
    }

    #[test]
    fn test_frame_too_large() {
        let text = " ".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(decode(&text), Err(CodecError::FrameTooLarge(_))));
    }

    #[test]
    fn test_encode_uses_wire_names() {
        let envelope = Envelope::new(kinds::LOG, json!({"level": "info"}));
        let text = encode(&envelope).expect("encode failed");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["type"], "log");
        assert_eq!(value["data"]["level"], "info");
    }

    #[test]
    fn test_ping_frame_is_not_json() {
        assert!(is_ping(PING_FRAME));
        assert!(decode(PING_FRAME).is_err());
    }
}
