//! PostgreSQL database service
//!
//! Row-wise destination for shared deployments:
//! - Connection pooling with min/max bounds
//! - Idle connection cleanup and lifetime cycling
//! - Statement timeout protection
//!
//! All schema definitions and migrations are managed here.

pub mod error;
mod migrations;
pub mod repositories;
mod repository_impl;
pub mod schema;

pub use error::PostgresError;
pub use sqlx::PgPool;

use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::log::LevelFilter;

use crate::core::config::PostgresConfig;
use crate::core::constants::{
    POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
    POSTGRES_DEFAULT_MIN_CONNECTIONS, POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

fn or_default<T: PartialOrd + Default>(value: T, default: T) -> T {
    if value > T::default() { value } else { default }
}

/// Build a pool from configuration (shared with the Redshift warehouse)
pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, PostgresError> {
    let url = config.url.as_str();
    if url.is_empty() {
        return Err(PostgresError::Config("PostgreSQL URL is required".into()));
    }

    let max_connections = or_default(config.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS);
    let min_connections = or_default(config.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS);
    let acquire_timeout = or_default(
        config.acquire_timeout_secs,
        POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
    );
    let idle_timeout = or_default(config.idle_timeout_secs, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS);
    let max_lifetime = or_default(config.max_lifetime_secs, POSTGRES_DEFAULT_MAX_LIFETIME_SECS);
    let statement_timeout = or_default(
        config.statement_timeout_secs,
        POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
    );

    let mut options: PgConnectOptions = url
        .parse()
        .map_err(|e| PostgresError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;

    options = options.log_statements(LevelFilter::Trace);

    // Redshift rejects unknown startup parameters
    if config.send_statement_timeout {
        options = options.options([("statement_timeout", format!("{}s", statement_timeout))]);
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout))
        .idle_timeout(Duration::from_secs(idle_timeout))
        .max_lifetime(Duration::from_secs(max_lifetime))
        .connect_with(options)
        .await?;

    tracing::debug!(
        max_connections,
        min_connections,
        acquire_timeout_secs = acquire_timeout,
        idle_timeout_secs = idle_timeout,
        max_lifetime_secs = max_lifetime,
        statement_timeout_secs = statement_timeout,
        "PostgreSQL pool connected"
    );
    Ok(pool)
}

/// PostgreSQL database service
pub struct PostgresService {
    pool: PgPool,
}

impl PostgresService {
    /// Connect and run any pending migrations
    pub async fn init(config: &PostgresConfig) -> Result<Self, PostgresError> {
        let pool = connect_pool(config).await?;
        migrations::run_migrations(&pool).await?;
        tracing::debug!("PostgresService initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}
