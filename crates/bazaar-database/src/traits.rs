//! Store contracts consumed by the chat gateway.

use async_trait::async_trait;

use bazaar_core::result::AppResult;
use bazaar_core::types::{ConversationId, MessageId, UserId};
use bazaar_entity::{Conversation, Message, MessageType};

/// Conversation lookup with participant-based access control.
#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    /// Fetch a conversation visible to `user_id`.
    ///
    /// Returns `None` when the conversation does not exist or `user_id` is
    /// not one of its two participants.
    async fn get_conversation(
        &self,
        id: ConversationId,
        user_id: UserId,
    ) -> AppResult<Option<Conversation>>;
}

/// Message persistence and status transitions.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a new message in the `sent` state.
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
        message_type: MessageType,
    ) -> AppResult<Message>;

    /// Mark a message read by `reader_id`, returning the updated row.
    ///
    /// Fails with `NotFound` when the message does not exist or the reader
    /// is not a participant of its conversation. Reading one's own message
    /// leaves it untouched.
    async fn mark_as_read(&self, message_id: MessageId, reader_id: UserId) -> AppResult<Message>;

    /// Advance a `sent` message to `delivered`. Never regresses a read message.
    async fn mark_as_delivered(&self, message_id: MessageId) -> AppResult<()>;
}

/// Persisted per-user presence bookkeeping.
#[async_trait]
pub trait PresenceStore: Send + Sync + 'static {
    /// Apply a connection-count `delta` (+1 on connect, -1 on disconnect).
    async fn update_presence(&self, user_id: UserId, is_online: bool, delta: i32) -> AppResult<()>;
}
