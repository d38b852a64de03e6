//! Unified error type for the data layer
//!
//! Wraps errors from every destination (SQLite, PostgreSQL, DuckDB,
//! Redshift) and from the source readers feeding them.

use thiserror::Error;

use crate::data::source::SourceError;

/// Unified error type for data layer operations
#[derive(Error, Debug)]
pub enum DataError {
    /// SQLite database error (row-wise destination)
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    /// PostgreSQL database error (row-wise destination)
    #[error("PostgreSQL error: {0}")]
    Postgres(sqlx::Error),

    /// Redshift error (warehouse destination, Postgres wire protocol)
    #[error("Redshift error: {0}")]
    Redshift(sqlx::Error),

    /// DuckDB database error (warehouse and lake)
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Source read error surfaced by a staging load
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Migration {version} ({name}) failed on {backend}: {error}")]
    MigrationFailed {
        backend: &'static str,
        version: i32,
        name: String,
        error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query timeout after {timeout_secs}s on {backend}")]
    Timeout {
        backend: &'static str,
        timeout_secs: u64,
    },

    /// Object storage error while publishing output
    #[error("S3 error for {location}: {message}")]
    S3 { location: String, message: String },

    /// Column name outside the table catalog
    #[error("Unknown column {column} on table {table}")]
    UnknownColumn { table: &'static str, column: String },
}

impl DataError {
    pub fn from_redshift(e: sqlx::Error) -> Self {
        Self::Redshift(e)
    }

    pub fn timeout(backend: &'static str, timeout_secs: u64) -> Self {
        Self::Timeout {
            backend,
            timeout_secs,
        }
    }

    pub fn s3(location: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::S3 {
            location: location.into(),
            message: err.to_string(),
        }
    }
}

impl From<crate::data::duckdb::DuckdbError> for DataError {
    fn from(e: crate::data::duckdb::DuckdbError) -> Self {
        match e {
            crate::data::duckdb::DuckdbError::Database(e) => Self::Duckdb(e),
            crate::data::duckdb::DuckdbError::Io(e) => Self::Io(e),
            crate::data::duckdb::DuckdbError::Timeout { timeout_secs } => Self::Timeout {
                backend: "duckdb",
                timeout_secs,
            },
        }
    }
}

impl From<crate::data::sqlite::SqliteError> for DataError {
    fn from(e: crate::data::sqlite::SqliteError) -> Self {
        match e {
            crate::data::sqlite::SqliteError::Database(e) => Self::Sqlite(e),
            crate::data::sqlite::SqliteError::MigrationFailed {
                version,
                name,
                error,
            } => Self::MigrationFailed {
                backend: "sqlite",
                version,
                name,
                error,
            },
            crate::data::sqlite::SqliteError::Io(e) => Self::Io(e),
        }
    }
}

impl From<crate::data::postgres::PostgresError> for DataError {
    fn from(e: crate::data::postgres::PostgresError) -> Self {
        match e {
            crate::data::postgres::PostgresError::Database(e) => Self::Postgres(e),
            crate::data::postgres::PostgresError::MigrationFailed {
                version,
                name,
                error,
            } => Self::MigrationFailed {
                backend: "postgres",
                version,
                name,
                error,
            },
            crate::data::postgres::PostgresError::Config(msg) => Self::Config(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failed_error_display() {
        let err = DataError::from(crate::data::postgres::PostgresError::MigrationFailed {
            version: 1,
            name: "star_schema".to_string(),
            error: "syntax error".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Migration 1 (star_schema) failed on postgres: syntax error"
        );
    }

    #[test]
    fn test_timeout_error_display() {
        let err = DataError::timeout("duckdb", 30);
        assert_eq!(err.to_string(), "Query timeout after 30s on duckdb");
    }
}
