//! Bazaar chat gateway: real-time buyer/seller messaging.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use bazaar_api::AppState;
use bazaar_auth::{JwtDecoder, TokenVerifier};
use bazaar_core::config::{AppConfig, LogFormat};
use bazaar_database::repositories::{ConversationRepository, MessageRepository, PresenceRepository};
use bazaar_database::{ConversationStore, DatabasePool, MemoryStore, MessageStore, PresenceStore};
use bazaar_realtime::RealtimeEngine;

#[tokio::main]
async fn main() {
    let env = std::env::var("BAZAAR_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Store collaborators selected by the database URL.
struct Stores {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    presence: Arc<dyn PresenceStore>,
    database: Option<DatabasePool>,
}

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if config.database.is_memory() {
        tracing::warn!("Using the in-memory store; data is lost on restart");
        let store = Arc::new(MemoryStore::new());
        return Ok(Stores {
            conversations: store.clone(),
            messages: store.clone(),
            presence: store,
            database: None,
        });
    }

    let database = DatabasePool::connect(&config.database)
        .await
        .context("Database connection failed")?;

    if config.database.run_migrations {
        database.migrate().await.context("Migration failed")?;
    }

    let pool = database.pool().clone();
    Ok(Stores {
        conversations: Arc::new(ConversationRepository::new(pool.clone())),
        messages: Arc::new(MessageRepository::new(pool.clone())),
        presence: Arc::new(PresenceRepository::new(pool)),
        database: Some(database),
    })
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Bazaar chat gateway v{}", env!("CARGO_PKG_VERSION"));
    let started_at = Instant::now();

    // ── Step 1: Stores ───────────────────────────────────────────
    let stores = open_stores(&config).await?;

    // ── Step 2: Auth ─────────────────────────────────────────────
    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtDecoder::new(&config.auth));

    // ── Step 3: Realtime engine ──────────────────────────────────
    let engine = Arc::new(RealtimeEngine::new(
        config.realtime.clone(),
        Arc::clone(&verifier),
        Arc::clone(&stores.conversations),
        Arc::clone(&stores.messages),
        stores.presence,
    ));

    // ── Step 4: HTTP server ──────────────────────────────────────
    let app_state = AppState {
        config: Arc::new(config.clone()),
        realtime: Arc::clone(&engine),
        verifier,
        conversations: stores.conversations,
        messages: stores.messages,
        database: stores.database.clone(),
        started_at,
    };
    let app = bazaar_api::build_app(app_state);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("Bazaar chat gateway listening on {addr}");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    // Upgraded sockets outlive the HTTP server's own drain, so the engine
    // closes them before the listener stops.
    let grace = config.server.shutdown_grace();
    let shutdown_engine = Arc::clone(&engine);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
            shutdown_engine.shutdown(grace).await;
        })
        .await
        .context("Server error")?;

    if let Some(database) = stores.database {
        database.close().await;
    }

    tracing::info!("Bazaar chat gateway shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
