//! Presence repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use bazaar_core::error::{AppError, ErrorKind};
use bazaar_core::result::AppResult;
use bazaar_core::types::UserId;
use bazaar_entity::PresenceRecord;

use crate::traits::PresenceStore;

/// Repository for the `user_presence` table.
#[derive(Debug, Clone)]
pub struct PresenceRepository {
    pool: PgPool,
}

impl PresenceRepository {
    /// Create a new presence repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Last persisted presence for a user.
    pub async fn find(&self, user_id: UserId) -> AppResult<Option<PresenceRecord>> {
        sqlx::query_as::<_, PresenceRecord>("SELECT * FROM user_presence WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to fetch presence", e))
    }
}

#[async_trait]
impl PresenceStore for PresenceRepository {
    async fn update_presence(&self, user_id: UserId, is_online: bool, delta: i32) -> AppResult<()> {
        // The count is authoritative; `is_online` only seeds a first insert.
        sqlx::query(
            "INSERT INTO user_presence (user_id, is_online, connection_count, last_seen_at) \
             VALUES ($1, $2 AND $3 > 0, GREATEST($3, 0), NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET \
               connection_count = GREATEST(user_presence.connection_count + $3, 0), \
               is_online = GREATEST(user_presence.connection_count + $3, 0) > 0, \
               last_seen_at = NOW()",
        )
        .bind(user_id)
        .bind(is_online)
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update presence", e))?;
        Ok(())
    }
}
