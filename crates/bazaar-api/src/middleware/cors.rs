//! CORS for browser chat clients.

use std::time::Duration;

use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use bazaar_core::config::CorsConfig;

/// Builds the CORS layer for the REST fallback and health routes.
///
/// The WebSocket upgrade carries its token in the query string, so only
/// `Authorization` and `Content-Type` need to be allowed.
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(allowed_origins(&config.allowed_origins))
        .max_age(Duration::from_secs(config.max_age_seconds))
}

fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.iter().any(|o| o == "*") {
        return AllowOrigin::from(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(parsed)
}
