//! # Database Pool Management
//!
//! Thin wrapper over a single PostgreSQL connection pool. All components
//! share this pool; writes are transactional at the batch boundary and the
//! pool handles concurrent access internally.

use crate::{config::DatabaseConfig, error::Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

/// Shared database handle for the whole pipeline.
///
/// `DatabasePool` is `Clone` and safe to share across async tasks; the
/// underlying `PgPool` is internally reference counted.
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Establishes the connection pool. Fails fast when the datastore is
    /// unreachable, which the orchestrator treats as a fatal startup error.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing database pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        info!("Database pool initialized");
        Ok(Self { pool })
    }

    /// Wraps an existing pool, used by tests and embedded callers.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn get(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending sqlx migrations from the workspace `migrations/`
    /// directory.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::Error::fatal(format!("migration failure: {e}")))?;
        info!("Migrations completed");
        Ok(())
    }

    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
