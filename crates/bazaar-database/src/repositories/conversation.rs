//! Conversation repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use bazaar_core::error::{AppError, ErrorKind};
use bazaar_core::result::AppResult;
use bazaar_core::types::{ConversationId, UserId};
use bazaar_entity::Conversation;

use crate::traits::ConversationStore;

/// Repository for conversation lookups.
#[derive(Debug, Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    /// Create a new conversation repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a conversation row.
    pub async fn create(&self, conversation: &Conversation) -> AppResult<Conversation> {
        sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations \
             (id, listing_id, client_id, owner_id, archived_by_client, archived_by_owner, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(conversation.id)
        .bind(conversation.listing_id)
        .bind(conversation.client_id)
        .bind(conversation.owner_id)
        .bind(conversation.archived_by_client)
        .bind(conversation.archived_by_owner)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create conversation", e))
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn get_conversation(
        &self,
        id: ConversationId,
        user_id: UserId,
    ) -> AppResult<Option<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 AND (client_id = $2 OR owner_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to fetch conversation", e))
    }
}
