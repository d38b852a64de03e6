//! Data layer
//!
//! - `source` - readers for the song-catalog and activity-log JSON files
//! - `sqlite`, `postgres` - row-wise destinations
//! - `duckdb` - local warehouse and in-memory lake database
//! - `warehouse` - staging + transform destinations (DuckDB, Redshift)
//! - `cluster` - compute cluster provisioning
//! - `publish` - upload of exported files to object storage
//! - `sql` - warehouse SQL generation per dialect
//! - `types` - records, rows and the table catalog shared by all backends
//! - `traits` - repository traits implemented by the destinations
//! - `error` - unified error type for all backends

pub mod cluster;
pub mod duckdb;
pub mod error;
pub mod postgres;
pub mod publish;
pub mod source;
pub mod sql;
pub mod sqlite;
pub mod traits;
pub mod types;
pub mod warehouse;

pub use duckdb::DuckdbService;
pub use postgres::PostgresService;
pub use sqlite::SqliteService;

pub use error::DataError;
pub use traits::{FileLoad, StarRepository, TableCatalog};

use std::path::Path;
use std::sync::Arc;

use crate::core::config::{DatabaseBackend, PostgresConfig};

/// Row-wise destination service.
///
/// Wraps the backend-specific service (SQLite or PostgreSQL) and hands out
/// its repositories as trait objects.
pub enum TransactionalService {
    /// SQLite backend (default, embedded)
    Sqlite(Arc<SqliteService>),
    /// PostgreSQL backend
    Postgres(Arc<PostgresService>),
}

impl TransactionalService {
    /// Open the configured backend and bring its schema up to date
    pub async fn init(
        backend: DatabaseBackend,
        sqlite_path: &Path,
        postgres_config: Option<&PostgresConfig>,
    ) -> Result<Self, DataError> {
        match backend {
            DatabaseBackend::Sqlite => {
                let service = SqliteService::init(sqlite_path).await?;
                Ok(Self::Sqlite(Arc::new(service)))
            }
            DatabaseBackend::Postgres => {
                let config = postgres_config.ok_or_else(|| {
                    DataError::Config("PostgreSQL configuration required".to_string())
                })?;
                let service = PostgresService::init(config).await?;
                Ok(Self::Postgres(Arc::new(service)))
            }
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Sqlite(s) => {
                if let Err(e) = s.checkpoint().await {
                    tracing::warn!(error = %e, "SQLite checkpoint before close failed");
                }
                s.close().await
            }
            Self::Postgres(p) => p.close().await,
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Self::Sqlite(_) => DatabaseBackend::Sqlite,
            Self::Postgres(_) => DatabaseBackend::Postgres,
        }
    }

    /// Row-wise star writes
    pub fn repository(&self) -> Box<dyn StarRepository> {
        match self {
            Self::Sqlite(s) => Box::new(Arc::clone(s)),
            Self::Postgres(p) => Box::new(Arc::clone(p)),
        }
    }

    /// Catalog and count queries for the quality gate
    pub fn catalog(&self) -> Box<dyn TableCatalog> {
        match self {
            Self::Sqlite(s) => Box::new(Arc::clone(s)),
            Self::Postgres(p) => Box::new(Arc::clone(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparkifydb.sqlite");
        let service = TransactionalService::init(DatabaseBackend::Sqlite, &path, None)
            .await
            .unwrap();

        assert_eq!(service.backend(), DatabaseBackend::Sqlite);
        assert_eq!(service.catalog().backend(), "sqlite");
        service.close().await;
    }

    #[tokio::test]
    async fn test_postgres_requires_config() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            TransactionalService::init(DatabaseBackend::Postgres, &dir.path().join("x"), None)
                .await;
        assert!(matches!(result, Err(DataError::Config(_))));
    }
}
