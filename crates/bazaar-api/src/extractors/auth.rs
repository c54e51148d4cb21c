//! `AuthUser` extractor: pulls the bearer token from the Authorization
//! header and resolves it to a user.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use bazaar_core::error::AppError;
use bazaar_core::types::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller of a REST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

/// The bearer token of the Authorization header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing or malformed Authorization header"))?;

        let user_id = state.verifier.verify_token(token).await?;
        Ok(AuthUser(user_id))
    }
}
