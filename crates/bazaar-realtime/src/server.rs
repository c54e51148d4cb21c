//! Top-level chat engine that ties the realtime subsystems together.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{info, warn};

use bazaar_auth::TokenVerifier;
use bazaar_core::config::RealtimeConfig;
use bazaar_database::{ConversationStore, MessageStore, PresenceStore};

use crate::broadcast::router::BroadcastRouter;
use crate::connection::handle::{WireMessage, close_code};
use crate::connection::registry::ConnectionRegistry;
use crate::metrics::{MetricsSnapshot, RealtimeMetrics};
use crate::protocol::handler::ProtocolHandler;

/// Central chat engine shared by every connection task.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Live sockets, participants, and presence.
    pub registry: Arc<ConnectionRegistry>,
    /// Frame fan-out.
    pub router: Arc<BroadcastRouter>,
    /// Per-connection protocol.
    pub handler: Arc<ProtocolHandler>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("connections", &self.registry.connection_count())
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates the engine around its store collaborators.
    pub fn new(
        config: RealtimeConfig,
        verifier: Arc<dyn TokenVerifier>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        presence: Arc<dyn PresenceStore>,
    ) -> Self {
        let metrics = Arc::new(RealtimeMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(BroadcastRouter::new(
            registry.clone(),
            presence,
            metrics.clone(),
            &config,
        ));
        let handler = Arc::new(ProtocolHandler::new(
            router.clone(),
            verifier,
            conversations,
            messages,
            config,
        ));

        info!("Chat engine initialized");

        Self {
            registry,
            router,
            handler,
            metrics,
        }
    }

    /// Current counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Closes every connection with "going away" and waits up to `grace`
    /// for their teardown to finish.
    pub async fn shutdown(&self, grace: Duration) {
        let connections = self.registry.all_connections();
        info!(connections = connections.len(), "Shutting down chat engine");

        let timeout = self.router.write_timeout();
        join_all(connections.iter().map(|handle| async move {
            handle
                .send(WireMessage::close(close_code::GOING_AWAY, "Server shutting down"), timeout)
                .await;
            handle.mark_dead();
        }))
        .await;

        let deadline = Instant::now() + grace;
        while self.registry.connection_count() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    remaining = self.registry.connection_count(),
                    "Chat connections still open after grace period"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        info!("Chat engine shut down");
    }
}
