//! # bazaar-api
//!
//! HTTP layer for the Bazaar chat gateway built on Axum.
//!
//! Serves the `/chat/{conversation_id}` WebSocket upgrade, the REST
//! fallback for sending messages, and health endpoints.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
