//! Response DTOs.

use serde::{Deserialize, Serialize};

use bazaar_realtime::metrics::MetricsSnapshot;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Overall gateway health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// Sockets are served but the database is unreachable.
    Degraded,
}

/// Which store backs the gateway, and whether it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseState {
    Memory,
    Connected,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Gateway load and counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    pub status: HealthStatus,
    pub database: DatabaseState,
    /// Open chat sockets.
    pub ws_connections: usize,
    /// Users with at least one socket.
    pub online_users: usize,
    /// Conversations with a connected participant.
    pub active_conversations: usize,
    pub metrics: MetricsSnapshot,
}
