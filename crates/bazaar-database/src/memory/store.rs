//! In-memory implementation of every store contract, backed by dashmap.
//!
//! Selected with `database.url = "memory://"`; also the backend of the
//! integration tests.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use bazaar_core::error::AppError;
use bazaar_core::result::AppResult;
use bazaar_core::types::{ConversationId, MessageId, UserId};
use bazaar_entity::{Conversation, Message, MessageStatus, MessageType, PresenceRecord};

use crate::traits::{ConversationStore, MessageStore, PresenceStore};

/// Thread-safe in-memory conversation, message, and presence store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: DashMap<ConversationId, Conversation>,
    messages: DashMap<MessageId, Message>,
    presence: DashMap<UserId, PresenceRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a conversation.
    pub fn insert_conversation(&self, conversation: Conversation) {
        self.conversations.insert(conversation.id, conversation);
    }

    /// All messages of a conversation, oldest first.
    pub fn messages_in(&self, conversation_id: ConversationId) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| entry.value().conversation_id == conversation_id)
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    /// Look up a single message.
    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.messages.get(&id).map(|entry| entry.value().clone())
    }

    /// Last recorded presence for a user.
    pub fn presence(&self, user_id: UserId) -> Option<PresenceRecord> {
        self.presence.get(&user_id).map(|entry| entry.value().clone())
    }

    fn is_participant(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.conversations
            .get(&conversation_id)
            .is_some_and(|c| c.is_participant(user_id))
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_conversation(
        &self,
        id: ConversationId,
        user_id: UserId,
    ) -> AppResult<Option<Conversation>> {
        Ok(self
            .conversations
            .get(&id)
            .filter(|c| c.is_participant(user_id))
            .map(|c| c.value().clone()))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
        message_type: MessageType,
    ) -> AppResult<Message> {
        if !self.is_participant(conversation_id, sender_id) {
            return Err(AppError::forbidden(format!(
                "User {sender_id} is not a participant of conversation {conversation_id}"
            )));
        }
        if content.trim().is_empty() {
            return Err(AppError::validation("Message content must not be empty"));
        }

        let message = Message::new(conversation_id, sender_id, content, message_type);
        self.messages.insert(message.id, message.clone());
        if let Some(mut conv) = self.conversations.get_mut(&conversation_id) {
            conv.updated_at = message.created_at;
        }

        debug!(message_id = %message.id, conversation_id = %conversation_id, "Message stored");
        Ok(message)
    }

    async fn mark_as_read(&self, message_id: MessageId, reader_id: UserId) -> AppResult<Message> {
        let conversation_id = self
            .messages
            .get(&message_id)
            .map(|m| m.conversation_id)
            .ok_or_else(|| AppError::not_found(format!("Message {message_id} not found")))?;

        if !self.is_participant(conversation_id, reader_id) {
            return Err(AppError::not_found(format!("Message {message_id} not found")));
        }

        let mut message = self
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| AppError::not_found(format!("Message {message_id} not found")))?;

        if message.sender_user_id != reader_id && message.status.advance(MessageStatus::Read) {
            let now = Utc::now();
            message.read_at = Some(now);
            message.updated_at = now;
        }

        Ok(message.clone())
    }

    async fn mark_as_delivered(&self, message_id: MessageId) -> AppResult<()> {
        if let Some(mut message) = self.messages.get_mut(&message_id) {
            if message.status.advance(MessageStatus::Delivered) {
                message.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn update_presence(&self, user_id: UserId, _is_online: bool, delta: i32) -> AppResult<()> {
        self.presence
            .entry(user_id)
            .or_insert_with(|| PresenceRecord::offline(user_id))
            .apply_delta(delta);
        Ok(())
    }
}
