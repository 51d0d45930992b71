//! Postgres persistence
//!
//! SeaORM entities, the [`Repository`] behind the store traits, and the
//! primary/replica pool that both binaries share. Schema lives in the
//! crate's `migrations/` directory and is embedded at compile time.

pub mod models;
mod repository;

pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::{debug, info};

/// Writes go to `primary`; reads use `replica` when one is configured
#[derive(Clone)]
pub struct DbPool {
    pub primary: DatabaseConnection,
    pub replica: Option<DatabaseConnection>,
}

async fn connect(url: &str, config: &DatabaseConfig, role: &str) -> Result<DatabaseConnection> {
    debug!(role = role, max = config.max_connections, "Opening database pool");

    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);

    Database::connect(opts)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect to {}: {}", role, e),
        })
}

impl DbPool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let primary = connect(&config.url, config, "primary").await?;

        let replica = match config.read_url.as_deref() {
            Some(url) if url != config.url => Some(connect(url, config, "replica").await?),
            _ => None,
        };

        info!(replica = replica.is_some(), "Database connections established");
        Ok(Self { primary, replica })
    }

    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Apply any migrations not yet recorded in `_sqlx_migrations`
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(self.primary.get_postgres_connection_pool())
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Migration failed: {}", e),
            })?;

        info!("Database schema is up to date");
        Ok(())
    }

    /// `SELECT 1` against every pool
    pub async fn ping(&self) -> Result<()> {
        let pools = std::iter::once(("primary", &self.primary))
            .chain(self.replica.iter().map(|r| ("replica", r)));

        for (role, conn) in pools {
            conn.execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("{} ping failed: {}", role, e),
                })?;
        }

        Ok(())
    }
}
