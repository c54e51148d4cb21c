//! Health check handlers.

use axum::Json;
use axum::extract::State;
use tracing::warn;

use crate::dto::response::{
    ApiResponse, DatabaseState, DetailedHealthResponse, HealthResponse, HealthStatus,
};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: HealthStatus::Ok,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

/// GET /api/health/detailed
pub async fn health_detailed(
    State(state): State<AppState>,
) -> Json<ApiResponse<DetailedHealthResponse>> {
    let database = match &state.database {
        None => DatabaseState::Memory,
        Some(pool) => match pool.ping().await {
            Ok(true) => DatabaseState::Connected,
            Ok(false) => DatabaseState::Unavailable,
            Err(e) => {
                warn!(error = %e, "Database ping failed");
                DatabaseState::Unavailable
            }
        },
    };
    let status = match database {
        DatabaseState::Unavailable => HealthStatus::Degraded,
        DatabaseState::Memory | DatabaseState::Connected => HealthStatus::Ok,
    };

    let registry = &state.realtime.registry;
    Json(ApiResponse::ok(DetailedHealthResponse {
        status,
        database,
        ws_connections: registry.connection_count(),
        online_users: registry.online_user_count(),
        active_conversations: registry.active_conversation_count(),
        metrics: state.realtime.metrics_snapshot(),
    }))
}
