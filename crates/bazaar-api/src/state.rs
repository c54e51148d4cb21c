//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use bazaar_auth::TokenVerifier;
use bazaar_core::config::AppConfig;
use bazaar_database::{ConversationStore, DatabasePool, MessageStore};
use bazaar_realtime::RealtimeEngine;

/// Application state passed to every handler via `State<AppState>`.
///
/// All fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Chat engine
    pub realtime: Arc<RealtimeEngine>,
    /// Resolves bearer tokens to users
    pub verifier: Arc<dyn TokenVerifier>,
    /// Conversation lookups for the REST fallback
    pub conversations: Arc<dyn ConversationStore>,
    /// Message persistence for the REST fallback
    pub messages: Arc<dyn MessageStore>,
    /// PostgreSQL pool, absent with the in-memory store
    pub database: Option<DatabasePool>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("realtime", &self.realtime)
            .field("database", &self.database.is_some())
            .finish()
    }
}
