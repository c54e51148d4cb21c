//! JWT token creation.
//!
//! Tokens are normally issued by the identity service; the encoder lives
//! here so local tooling and tests can mint tokens the gateway accepts.

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};

use bazaar_core::config::AuthConfig;
use bazaar_core::error::AppError;
use bazaar_core::types::UserId;

use super::claims::Claims;

/// Creates signed JWT access tokens.
#[derive(Clone)]
pub struct JwtEncoder {
    /// HMAC secret key for signing.
    encoding_key: EncodingKey,
    /// Access token TTL in minutes.
    access_ttl_minutes: i64,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .finish()
    }
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl_minutes: config.jwt_access_ttl_minutes as i64,
        }
    }

    /// Signs an access token for `user_id`.
    pub fn access_token(&self, user_id: UserId) -> Result<String, AppError> {
        let ttl = chrono::Duration::minutes(self.access_ttl_minutes);
        self.sign(&Claims::access(user_id, Utc::now(), ttl))
    }

    /// Signs arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign token: {e}")))
    }
}
