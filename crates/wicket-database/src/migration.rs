//! Database migration runner.

use tracing::info;

use wicket_core::{SessionError, SessionResult};

use crate::connection::DatabasePool;

/// Run all pending database migrations.
pub async fn run_migrations(pool: &DatabasePool) -> SessionResult<()> {
    info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool.pool())
        .await
        .map_err(|e| SessionError::database("Failed to run migrations", e))?;

    info!("Database migrations completed successfully");
    Ok(())
}
