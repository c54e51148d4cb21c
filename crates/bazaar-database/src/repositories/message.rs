//! Message repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use bazaar_core::error::{AppError, ErrorKind};
use bazaar_core::result::AppResult;
use bazaar_core::types::{ConversationId, MessageId, UserId};
use bazaar_entity::{Message, MessageStatus, MessageType};

use crate::traits::MessageStore;

/// Repository for message rows.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a live message visible to `user_id`.
    async fn find_visible(&self, id: MessageId, user_id: UserId) -> AppResult<Option<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT m.* FROM messages m \
             JOIN conversations c ON c.id = m.conversation_id \
             WHERE m.id = $1 AND m.deleted_at IS NULL \
             AND (c.client_id = $2 OR c.owner_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to fetch message", e))
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
        message_type: MessageType,
    ) -> AppResult<Message> {
        let message = Message::new(conversation_id, sender_id, content, message_type);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        let created = sqlx::query_as::<_, Message>(
            "INSERT INTO messages \
             (id, conversation_id, sender_user_id, content, message_type, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_user_id)
        .bind(&message.content)
        .bind(message.message_type)
        .bind(message.status)
        .bind(message.created_at)
        .bind(message.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create message", e))?;

        sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(conversation_id)
            .bind(created.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to touch conversation", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit message", e))?;

        Ok(created)
    }

    async fn mark_as_read(&self, message_id: MessageId, reader_id: UserId) -> AppResult<Message> {
        let message = self
            .find_visible(message_id, reader_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Message {message_id} not found")))?;

        if message.sender_user_id == reader_id || message.status == MessageStatus::Read {
            return Ok(message);
        }

        sqlx::query_as::<_, Message>(
            "UPDATE messages SET status = 'read', read_at = COALESCE(read_at, NOW()), updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark message read", e))
    }

    async fn mark_as_delivered(&self, message_id: MessageId) -> AppResult<()> {
        sqlx::query(
            "UPDATE messages SET status = 'delivered', updated_at = NOW() \
             WHERE id = $1 AND status = 'sent'",
        )
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark message delivered", e)
        })?;
        Ok(())
    }
}
