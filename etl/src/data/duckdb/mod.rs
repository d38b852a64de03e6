//! DuckDB service
//!
//! Backs both the local warehouse (file database) and the lake export
//! (in-memory database). Uses a single shared connection protected by a
//! mutex; every call runs on the blocking pool.

pub mod error;
pub mod repositories;
mod repository_impl;
pub mod sql_types;

pub use error::DuckdbError;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use duckdb::Connection;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::core::constants::DUCKDB_QUERY_TIMEOUT_SECS;

const SESSION_SETTINGS: &str = "SET autoinstall_known_extensions = false;
     SET autoload_known_extensions = false;
     SET extension_directory = '';
     LOAD json;
     LOAD parquet;";

pub struct DuckdbService {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl Drop for DuckdbService {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take()
            && let Err((_, e)) = conn.close()
        {
            tracing::warn!("DuckDB connection close failed during drop: {}", e);
        }
    }
}

impl DuckdbService {
    /// Open a database file, or an in-memory database when `path` is `None`
    pub async fn open(path: Option<&Path>) -> Result<Self, DuckdbError> {
        if let Some(parent) = path.and_then(Path::parent)
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let owned = path.map(Path::to_path_buf);
        let target = owned.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = match target {
                Some(p) => Connection::open(p)?,
                None => Connection::open_in_memory()?,
            };
            conn.execute_batch(SESSION_SETTINGS)?;
            Ok::<_, duckdb::Error>(conn)
        })
        .await
        .map_err(|e| DuckdbError::Io(std::io::Error::other(e)))??;

        match &owned {
            Some(p) => tracing::debug!(path = %p.display(), "DuckdbService initialized"),
            None => tracing::debug!("DuckdbService initialized in memory"),
        }
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: owned,
        })
    }

    /// Database file, `None` for an in-memory database
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exclusive access to the connection; fails after `close()`
    pub fn conn(&self) -> Result<MappedMutexGuard<'_, Connection>, DuckdbError> {
        MutexGuard::try_map(self.conn.lock(), |opt| opt.as_mut())
            .map_err(|_| DuckdbError::closed())
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Run a blocking DuckDB call with timeout
    pub async fn run_query<T, F>(f: F) -> Result<T, DuckdbError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let timeout = Duration::from_secs(DUCKDB_QUERY_TIMEOUT_SECS);
        tokio::time::timeout(timeout, tokio::task::spawn_blocking(f))
            .await
            .map_err(|_| {
                tracing::warn!(
                    "DuckDB query timed out after {}s",
                    DUCKDB_QUERY_TIMEOUT_SECS
                );
                DuckdbError::Timeout {
                    timeout_secs: DUCKDB_QUERY_TIMEOUT_SECS,
                }
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "DuckDB query task failed");
                DuckdbError::Io(std::io::Error::other(format!(
                    "Query execution failed: {}",
                    e
                )))
            })
    }

    /// Run `f` against the locked connection on the blocking pool
    pub async fn with_conn<T, F>(self: &Arc<Self>, f: F) -> Result<T, DuckdbError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DuckdbError> + Send + 'static,
    {
        let db = Arc::clone(self);
        Self::run_query(move || {
            let conn = db.conn()?;
            f(&conn)
        })
        .await?
    }

    /// Flush the WAL to the database file. No-op once closed.
    pub async fn checkpoint(self: &Arc<Self>) -> Result<(), DuckdbError> {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn_guard = db.conn.lock();
            if let Some(ref conn) = *conn_guard {
                conn.execute("CHECKPOINT", [])?;
                tracing::debug!("DuckDB checkpoint completed");
            }
            Ok(())
        })
        .await
        .map_err(|e| DuckdbError::Io(std::io::Error::other(e)))?
    }

    pub async fn close(self: Arc<Self>) -> Result<(), DuckdbError> {
        tokio::task::spawn_blocking(move || {
            let mut conn_guard = self.conn.lock();
            if let Some(conn) = conn_guard.take() {
                if self.path.is_some()
                    && let Err(e) = conn.execute("CHECKPOINT", [])
                {
                    tracing::warn!("CHECKPOINT failed during close: {}", e);
                }
                conn.close().map_err(|(_, e)| DuckdbError::Database(e))?;
                tracing::debug!("DuckDB connection closed");
            }
            Ok(())
        })
        .await
        .map_err(|e| DuckdbError::Io(std::io::Error::other(e)))?
    }
}

/// Execute a function within a transaction, rolling back on error
pub(crate) fn in_transaction<F, T>(conn: &Connection, f: F) -> Result<T, DuckdbError>
where
    F: FnOnce(&Connection) -> Result<T, DuckdbError>,
{
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(val) => {
            conn.execute_batch("COMMIT")?;
            Ok(val)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("ROLLBACK failed after transaction error: {}", rollback_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("warehouse.duckdb");
        let service = Arc::new(DuckdbService::open(Some(&path)).await.unwrap());

        assert!(service.is_open());
        assert_eq!(service.path(), Some(path.as_path()));
        service.checkpoint().await.unwrap();
        service.close().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_with_conn_runs_on_memory_database() {
        let service = Arc::new(DuckdbService::open(None).await.unwrap());
        let answer: i64 = service
            .with_conn(|conn| Ok(conn.query_row("SELECT 6 * 7", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(answer, 42);
    }

    #[tokio::test]
    async fn test_conn_after_close_is_error() {
        let service = Arc::new(DuckdbService::open(None).await.unwrap());
        let for_checkpoint = Arc::clone(&service);
        service.close().await.unwrap();

        assert!(for_checkpoint.checkpoint().await.is_ok());
        assert!(for_checkpoint.conn().is_err());
    }

    #[tokio::test]
    async fn test_in_transaction_rolls_back() {
        let service = DuckdbService::open(None).await.unwrap();
        let conn = service.conn().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        let result: Result<(), DuckdbError> = in_transaction(&conn, |conn| {
            conn.execute("INSERT INTO t VALUES (1)", [])?;
            Err(DuckdbError::closed())
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
