//! Token verification contract consumed by the chat gateway.

use async_trait::async_trait;

use bazaar_core::result::AppResult;
use bazaar_core::types::UserId;

use crate::jwt::JwtDecoder;

/// Resolves a bearer token to the user it was issued for.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verify `token`, returning the authenticated user.
    async fn verify_token(&self, token: &str) -> AppResult<UserId>;
}

#[async_trait]
impl TokenVerifier for JwtDecoder {
    async fn verify_token(&self, token: &str) -> AppResult<UserId> {
        let claims = self.decode_access_token(token)?;
        tracing::debug!(user_id = %claims.user_id(), "Access token verified");
        Ok(claims.user_id())
    }
}
