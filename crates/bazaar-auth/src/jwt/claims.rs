//! Access token payload.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazaar_core::types::UserId;

/// Claims carried by tokens the marketplace identity service issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user.
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
    pub token_type: TokenType,
}

/// Only access tokens open chat sockets; refresh tokens are refused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl Claims {
    /// Access token claims for `user_id`, valid for `ttl` from `issued_at`.
    pub fn access(user_id: UserId, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: user_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: Uuid::new_v4(),
            token_type: TokenType::Access,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.sub
    }

    pub fn is_access(&self) -> bool {
        self.token_type == TokenType::Access
    }
}
