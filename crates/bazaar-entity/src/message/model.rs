//! Message entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bazaar_core::types::{ConversationId, MessageId, UserId};

use super::kind::MessageType;
use super::status::MessageStatus;

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author of the message.
    pub sender_user_id: UserId,
    /// Message body (text or a URL, depending on `message_type`).
    pub content: String,
    /// Kind of content.
    pub message_type: MessageType,
    /// Delivery status.
    pub status: MessageStatus,
    /// When the message was read by the counterpart.
    pub read_at: Option<DateTime<Utc>>,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build a new, not yet persisted, message in the `sent` state.
    pub fn new(
        conversation_id: ConversationId,
        sender_user_id: UserId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            conversation_id,
            sender_user_id,
            content: content.into(),
            message_type,
            status: MessageStatus::Sent,
            read_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
