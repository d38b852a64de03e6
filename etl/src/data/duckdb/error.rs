//! DuckDB error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuckdbError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl DuckdbError {
    /// Error for use of a connection after `close()`
    pub fn closed() -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "DuckDB connection already closed",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = DuckdbError::Timeout { timeout_secs: 600 };
        assert_eq!(err.to_string(), "Query timeout after 600s");
    }

    #[test]
    fn test_closed_is_io() {
        assert!(matches!(DuckdbError::closed(), DuckdbError::Io(_)));
        assert!(DuckdbError::closed().to_string().contains("closed"));
    }
}
