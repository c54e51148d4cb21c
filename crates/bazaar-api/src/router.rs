//! Route definitions for the chat gateway.

use axum::Router;
use axum::routing::{get, post};

use crate::handlers;
use crate::state::AppState;

/// Build the router with every route, threaded with `state`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(message_routes())
        .merge(health_routes());

    Router::new()
        .route("/chat/{conversation_id}", get(handlers::ws::ws_upgrade))
        .nest("/api", api_routes)
        .with_state(state)
}

/// REST fallback for sending messages
fn message_routes() -> Router<AppState> {
    Router::new().route(
        "/conversations/{conversation_id}/messages",
        post(handlers::message::send_message),
    )
}

/// Liveness and diagnostics
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::health_detailed))
}
