//! Inbound and outbound chat frame definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bazaar_core::types::{ConversationId, MessageId, UserId};
use bazaar_entity::{Message, MessageStatus, MessageType};

/// Frame types a client may send.
pub const CLIENT_FRAME_TYPES: [&str; 4] = ["message", "typing", "read", "ping"];

/// Frames sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Send a chat message.
    Message {
        /// Message body.
        content: String,
        /// Kind of content; defaults to text.
        #[serde(default)]
        message_type: MessageType,
    },
    /// Typing indicator.
    Typing {
        /// Whether the user is typing.
        is_typing: bool,
    },
    /// Read receipt for a message.
    Read {
        /// Raw message id; validated by the handler.
        message_id: String,
    },
    /// Application-level heartbeat.
    Ping,
}

/// Why a raw text frame could not be turned into a [`ClientFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameParseError {
    /// Not JSON at all.
    #[error("Invalid JSON")]
    InvalidJson,
    /// JSON without a string `type` field.
    #[error("Missing message type")]
    MissingType,
    /// A `type` the gateway does not understand.
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    /// Known `type` with missing or ill-typed fields.
    #[error("Invalid {kind} frame: {reason}")]
    InvalidFields {
        /// Frame type.
        kind: String,
        /// Deserializer message.
        reason: String,
    },
}

impl ClientFrame {
    /// Parse a raw text frame.
    ///
    /// Parsing is two-staged so the error names what went wrong: malformed
    /// JSON, an unknown `type`, or bad fields for a known `type`.
    pub fn parse(raw: &str) -> Result<Self, FrameParseError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|_| FrameParseError::InvalidJson)?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(FrameParseError::MissingType)?
            .to_string();

        if !CLIENT_FRAME_TYPES.contains(&kind.as_str()) {
            return Err(FrameParseError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|e| FrameParseError::InvalidFields {
            kind,
            reason: e.to_string(),
        })
    }
}

/// Message payload of a `message` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// Message ID.
    pub id: MessageId,
    /// Author.
    pub sender_user_id: UserId,
    /// Body.
    pub content: String,
    /// Kind of content.
    pub message_type: MessageType,
    /// Delivery status at broadcast time.
    pub status: MessageStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl From<&Message> for MessageData {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_user_id: message.sender_user_id,
            content: message.content.clone(),
            message_type: message.message_type,
            status: message.status,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

/// Frames sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A persisted chat message.
    Message {
        /// Conversation the message belongs to.
        conversation_id: ConversationId,
        /// The message.
        data: MessageData,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Another participant started or stopped typing.
    Typing {
        /// Conversation.
        conversation_id: ConversationId,
        /// Typing user.
        user_id: UserId,
        /// Whether they are typing.
        is_typing: bool,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// A participant came online or went offline.
    Presence {
        /// Conversation.
        conversation_id: ConversationId,
        /// User whose presence changed.
        user_id: UserId,
        /// New state.
        is_online: bool,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// A message was read.
    ReadReceipt {
        /// Conversation.
        conversation_id: ConversationId,
        /// Message that was read.
        message_id: MessageId,
        /// Reader.
        read_by: UserId,
        /// When it was read.
        read_at: DateTime<Utc>,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Heartbeat reply.
    Pong {
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Protocol or store error for the sending connection.
    Error {
        /// Client-safe description.
        message: String,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
}

impl ServerFrame {
    /// Frame `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::Presence { .. } => "presence",
            Self::ReadReceipt { .. } => "read_receipt",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}
