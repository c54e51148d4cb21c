//! PostgreSQL pool for the chat tables.

use std::fmt;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use bazaar_core::config::DatabaseConfig;
use bazaar_core::error::{AppError, ErrorKind};

/// Shared sqlx pool backing the PostgreSQL repositories.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Opens the pool described by `config`.
    ///
    /// Fails with a configuration error when `config` selects the
    /// in-process store, since there is nothing to connect to.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        if config.is_memory() {
            return Err(AppError::configuration(
                "database.url selects the in-memory store; no pool to open",
            ));
        }

        info!(
            url = %Redacted(&config.url),
            max_connections = config.max_connections,
            "Opening chat database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections.min(config.max_connections))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Chat database unreachable", e))?;

        Ok(Self { pool })
    }

    /// Applies the conversation, message and presence migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Chat schema migration failed", e))?;
        info!("Chat schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trips a trivial query; `false` means the pool answered with
    /// something unexpected.
    pub async fn ping(&self) -> Result<bool, AppError> {
        let one: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Database ping failed", e))?;
        Ok(one == 1)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Chat database pool closed");
    }
}

/// Displays a connection URL with its password replaced by `****`.
struct Redacted<'a>(&'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.0;
        let authority_start = url.find("://").map_or(0, |i| i + 3);
        let Some(at) = url[authority_start..].rfind('@').map(|i| i + authority_start) else {
            return f.write_str(url);
        };
        match url[authority_start..at].find(':') {
            Some(colon) => {
                let colon = colon + authority_start;
                write!(f, "{}:****{}", &url[..colon], &url[at..])
            }
            None => f.write_str(url),
        }
    }
}
