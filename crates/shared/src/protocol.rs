//! Wire frames exchanged over the chat transport, and their text codec.
//!
//! Every frame is one JSON object tagged by its `type` field. A frame
//! carries only the fields relevant to its tag.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::models::{Identity, Message};

/// Close code of a clean, client-initiated closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported when a close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Spelling of the recipient key read by the chat server. Outbound `message`
/// frames carry it next to `receiver_id`.
pub const LEGACY_RECEIVER_KEY: &str = "reciever_id";

/// Every tag the protocol defines.
pub const FRAME_TYPES: [&str; 8] = [
    "auth",
    "auth_success",
    "error",
    "ping",
    "pong",
    "message",
    "message_sent",
    "new_message",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireFrame {
    /// Client -> server: first frame on every connection, carries the bearer credential.
    Auth { content: String },
    /// Server -> client: handshake accepted.
    AuthSuccess { user: Identity },
    /// Server -> client: human-readable failure.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Ping,
    Pong,
    /// Client -> server: send a direct message.
    Message {
        #[serde(alias = "reciever_id")]
        receiver_id: i64,
        content: String,
    },
    /// Server -> client: echo of a message this client sent, as stored.
    MessageSent(Message),
    /// Server -> client: a message another user sent to this client.
    NewMessage(Message),
}

impl WireFrame {
    pub fn auth(credential: impl Into<String>) -> Self {
        WireFrame::Auth {
            content: credential.into(),
        }
    }

    pub fn message(receiver_id: i64, content: impl Into<String>) -> Self {
        WireFrame::Message {
            receiver_id,
            content: content.into(),
        }
    }

    /// The frame's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            WireFrame::Auth { .. } => "auth",
            WireFrame::AuthSuccess { .. } => "auth_success",
            WireFrame::Error { .. } => "error",
            WireFrame::Ping => "ping",
            WireFrame::Pong => "pong",
            WireFrame::Message { .. } => "message",
            WireFrame::MessageSent(_) => "message_sent",
            WireFrame::NewMessage(_) => "new_message",
        }
    }

    /// Serialize to the text form sent over the transport.
    pub fn encode(&self) -> Result<String, FrameError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| FrameError::Malformed(e.to_string()))?;

        if let (WireFrame::Message { receiver_id, .. }, Some(fields)) =
            (self, value.as_object_mut())
        {
            fields.insert(LEGACY_RECEIVER_KEY.to_string(), (*receiver_id).into());
        }

        serde_json::to_string(&value).map_err(|e| FrameError::Malformed(e.to_string()))
    }

    /// Parse one inbound transport payload.
    ///
    /// A payload whose tag the protocol does not define yields
    /// [`FrameError::UnknownType`], so callers can tell it apart from a
    /// payload that is not a frame at all.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;

        let Some(tag) = value.get("type").and_then(serde_json::Value::as_str) else {
            return Err(FrameError::Malformed("missing `type` field".to_string()));
        };
        if !FRAME_TYPES.contains(&tag) {
            return Err(FrameError::UnknownType(tag.to_string()));
        }

        serde_json::from_value(value).map_err(|e| FrameError::Malformed(e.to_string()))
    }
}
