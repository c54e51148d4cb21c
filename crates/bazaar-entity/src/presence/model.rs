//! User presence row, as kept by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bazaar_core::types::UserId;

/// Last known presence of a user.
///
/// Invariant: `is_online == (connection_count > 0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PresenceRecord {
    /// The user.
    pub user_id: UserId,
    /// Whether at least one socket is open.
    pub is_online: bool,
    /// Number of open sockets.
    pub connection_count: i32,
    /// Last time presence changed.
    pub last_seen_at: DateTime<Utc>,
}

impl PresenceRecord {
    /// A record for a user that was never seen.
    pub fn offline(user_id: UserId) -> Self {
        Self {
            user_id,
            is_online: false,
            connection_count: 0,
            last_seen_at: Utc::now(),
        }
    }

    /// Apply a connection delta, clamping at zero.
    pub fn apply_delta(&mut self, delta: i32) {
        self.connection_count = (self.connection_count + delta).max(0);
        self.is_online = self.connection_count > 0;
        self.last_seen_at = Utc::now();
    }
}
