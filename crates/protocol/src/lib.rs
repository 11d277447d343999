//! Wire protocol shared by the gateway, its WebSocket clients and the
//! backend workers.
//!
//! Client → gateway frames are decoded once, at the connection boundary, into
//! the closed [`InboundMessage`] variant. Gateway → client frames are either a
//! [`ResponseFrame`] (acknowledgements, correlated by `messageId`) or an
//! [`AiResponseFrame`] carrying a worker's answer.

use serde::{Deserialize, Serialize};

/// Opaque numeric user identity, stable across reconnects.
pub type UserId = i64;

/// `sender` value used on frames originated by the system rather than a user.
pub const SYSTEM_SENDER: UserId = 0;

/// Fixed acknowledgement text sent for every accepted chat message.
pub const DEFAULT_ACK_MESSAGE: &str = "Message received, processing...";

/// `senderName` on worker-originated answers unless configured otherwise.
pub const DEFAULT_ASSISTANT_NAME: &str = "AI Assistant";

/// Path of the callback endpoint workers post their answers to.
pub const CALLBACK_PATH: &str = "/api/ai-response/send";

/// Frame `type` values.
pub mod kinds {
    pub const CHAT: &str = "CHAT";
    pub const HEARTBEAT: &str = "HEARTBEAT";
    pub const AI_RESPONSE: &str = "AI_RESPONSE";
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// A client frame that could not be decoded. The frame is dropped; the
/// connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
}

// ── Inbound ──────────────────────────────────────────────────────────────────

/// Fields shared by every client frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InboundFrame {
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub sender: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl InboundFrame {
    pub fn chat(message_id: impl Into<String>, content: impl Into<String>, sender: UserId) -> Self {
        Self {
            message_id: message_id.into(),
            kind: kinds::CHAT.into(),
            content: content.into(),
            sender,
            timestamp: Some(now_rfc3339()),
        }
    }

    pub fn heartbeat(sender: UserId) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            kind: kinds::HEARTBEAT.into(),
            content: String::new(),
            sender,
            timestamp: Some(now_rfc3339()),
        }
    }
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Chat(InboundFrame),
    Heartbeat(InboundFrame),
    Unknown(InboundFrame),
}

impl InboundMessage {
    pub fn frame(&self) -> &InboundFrame {
        match self {
            Self::Chat(f) | Self::Heartbeat(f) | Self::Unknown(f) => f,
        }
    }
}

/// Decode a raw text frame into an [`InboundMessage`].
///
/// Missing fields default to empty values; an unrecognised `type` decodes to
/// [`InboundMessage::Unknown`]. Only input that is not a JSON object fails.
pub fn decode_inbound(raw: &str) -> Result<InboundMessage, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let frame: InboundFrame = serde_json::from_value(value)?;
    Ok(match frame.kind.as_str() {
        kinds::CHAT => InboundMessage::Chat(frame),
        kinds::HEARTBEAT => InboundMessage::Heartbeat(frame),
        _ => InboundMessage::Unknown(frame),
    })
}

// ── Outbound ─────────────────────────────────────────────────────────────────

/// Acknowledgement / response correlated to an inbound `messageId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    pub success: bool,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub message: String,
}

impl ResponseFrame {
    pub fn ok(message_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: message_id.to_string(),
            message: message.into(),
        }
    }

    pub fn err(message_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: message_id.to_string(),
            message: message.into(),
        }
    }
}

/// A worker's answer pushed to a user's live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponseFrame {
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub sender: UserId,
    pub sender_name: String,
    pub timestamp: String,
}

impl AiResponseFrame {
    pub fn new(content: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            kind: kinds::AI_RESPONSE.into(),
            content: content.into(),
            sender: SYSTEM_SENDER,
            sender_name: sender_name.into(),
            timestamp: now_rfc3339(),
        }
    }
}

/// A decoded gateway frame, as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Response(ResponseFrame),
    AiResponse(AiResponseFrame),
    Unknown(serde_json::Value),
}

/// Decode a gateway → client frame.
pub fn decode_outbound(raw: &str) -> Result<OutboundMessage, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    if value.get("type").and_then(|v| v.as_str()) == Some(kinds::AI_RESPONSE) {
        return Ok(OutboundMessage::AiResponse(serde_json::from_value(value)?));
    }
    if value.get("success").is_some_and(|v| v.is_boolean()) {
        return Ok(OutboundMessage::Response(serde_json::from_value(value)?));
    }
    Ok(OutboundMessage::Unknown(value))
}

// ── HTTP boundaries ──────────────────────────────────────────────────────────

/// Body of the callback endpoint: a worker's finished answer for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponseRequest {
    pub user_id: UserId,
    pub content: String,
    #[serde(default)]
    pub source: String,
}

/// Success/failure indicator returned by the callback endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackReply {
    pub success: bool,
    pub message: String,
}

/// Query of the classification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub question: String,
    pub uid: UserId,
}

/// Result of the classification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub category: String,
    pub confidence: f64,
    pub description: String,
}

/// Job handed to a reasoning worker by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub user_id: UserId,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_chat_frame() {
        let raw = r#"{"messageId":"m1","type":"CHAT","content":"hello","sender":42,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let msg = decode_inbound(raw).unwrap();
        let InboundMessage::Chat(frame) = msg else {
            panic!("expected chat, got {msg:?}");
        };
        assert_eq!(frame.message_id, "m1");
        assert_eq!(frame.content, "hello");
        assert_eq!(frame.sender, 42);
    }

    #[test]
    fn decodes_heartbeat_with_missing_fields() {
        let msg = decode_inbound(r#"{"type":"HEARTBEAT"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Heartbeat(_)));
        assert_eq!(msg.frame().sender, 0);
    }

    #[test]
    fn unrecognised_type_is_unknown() {
        let msg = decode_inbound(r#"{"type":"TYPING","messageId":"x"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Unknown(ref f) if f.kind == "TYPING"));
        let msg = decode_inbound(r#"{"content":"no type"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Unknown(_)));
    }

    #[test]
    fn malformed_frames_fail() {
        assert!(matches!(
            decode_inbound("not json"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(decode_inbound("[1,2]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(
            decode_inbound(r#"{"type":"CHAT","sender":"abc"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn response_frame_wire_shape() {
        let v = serde_json::to_value(ResponseFrame::ok("m1", "ok")).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"success": true, "messageId": "m1", "message": "ok"})
        );
    }

    #[test]
    fn ai_response_frame_wire_shape() {
        let v = serde_json::to_value(AiResponseFrame::new("hi", "Bot")).unwrap();
        assert_eq!(v["type"], "AI_RESPONSE");
        assert_eq!(v["sender"], 0);
        assert_eq!(v["senderName"], "Bot");
        assert!(v["messageId"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(v["timestamp"].as_str().is_some());
    }

    #[test]
    fn decodes_outbound_frames() {
        let ack = serde_json::to_string(&ResponseFrame::err("m2", "nope")).unwrap();
        assert_eq!(
            decode_outbound(&ack).unwrap(),
            OutboundMessage::Response(ResponseFrame::err("m2", "nope"))
        );

        let ai = AiResponseFrame::new("answer", "Bot");
        let raw = serde_json::to_string(&ai).unwrap();
        assert_eq!(decode_outbound(&raw).unwrap(), OutboundMessage::AiResponse(ai));

        assert!(matches!(
            decode_outbound(r#"{"foo":1}"#).unwrap(),
            OutboundMessage::Unknown(_)
        ));
    }

    #[test]
    fn callback_request_uses_camel_case() {
        let req: AiResponseRequest =
            serde_json::from_str(r#"{"userId":7,"content":"c","source":"assistant"}"#).unwrap();
        assert_eq!(req.user_id, 7);
        assert_eq!(req.source, "assistant");
    }
}
