//! Constructors for outbound frames, stamped with the current time.

use chrono::{DateTime, Utc};

use bazaar_core::types::{ConversationId, MessageId, UserId};
use bazaar_entity::Message;

use super::types::{MessageData, ServerFrame};

/// Build a `message` frame for a persisted message
pub fn build_message(message: &Message) -> ServerFrame {
    ServerFrame::Message {
        conversation_id: message.conversation_id,
        data: MessageData::from(message),
        timestamp: Utc::now(),
    }
}

/// Build a `typing` frame
pub fn build_typing(conversation_id: ConversationId, user_id: UserId, is_typing: bool) -> ServerFrame {
    ServerFrame::Typing {
        conversation_id,
        user_id,
        is_typing,
        timestamp: Utc::now(),
    }
}

/// Build a `presence` frame
pub fn build_presence(conversation_id: ConversationId, user_id: UserId, is_online: bool) -> ServerFrame {
    ServerFrame::Presence {
        conversation_id,
        user_id,
        is_online,
        timestamp: Utc::now(),
    }
}

/// Build a `read_receipt` frame
pub fn build_read_receipt(
    conversation_id: ConversationId,
    message_id: MessageId,
    read_by: UserId,
    read_at: DateTime<Utc>,
) -> ServerFrame {
    ServerFrame::ReadReceipt {
        conversation_id,
        message_id,
        read_by,
        read_at,
        timestamp: Utc::now(),
    }
}

/// Build a `pong` frame
pub fn build_pong() -> ServerFrame {
    ServerFrame::Pong {
        timestamp: Utc::now(),
    }
}

/// Build an `error` frame
pub fn build_error(message: impl Into<String>) -> ServerFrame {
    ServerFrame::Error {
        message: message.into(),
        timestamp: Utc::now(),
    }
}
