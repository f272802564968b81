//! SQLite connection pool management.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use wicket_core::config::DatabaseConfig;
use wicket_core::{SessionError, SessionResult};

/// Wrapper around the sqlx SQLite connection pool.
///
/// Each pool value carries a stable identity so the per-request
/// transaction map can hold at most one open transaction per connectable
/// per request. Clones share the identity and the underlying pool.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    id: Uuid,
    pool: SqlitePool,
}

impl DatabasePool {
    /// Create a new database pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> SessionResult<Self> {
        info!(
            url = %config.url,
            max_connections = config.max_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| SessionError::database("Invalid database URL", e))?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory SQLite database exists per connection, so the pool
        // must be pinned to exactly one connection or each transaction
        // would see a different empty database.
        let in_memory = config.url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { config.max_connections })
            .min_connections(if in_memory { 1 } else { 0 })
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| SessionError::database("Failed to connect to database", e))?;

        info!("Successfully connected to SQLite");
        Ok(Self {
            id: Uuid::new_v4(),
            pool,
        })
    }

    /// Identity of this connectable, as keyed by the per-request
    /// transaction map.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Return a reference to the underlying sqlx pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> SessionResult<bool> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(|e| SessionError::database("Health check failed", e))
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// Whether a sqlx error is a unique-constraint violation, for the code
/// paths that treat duplicates as an ordinary outcome.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
