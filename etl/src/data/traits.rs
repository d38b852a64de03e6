//! Repository traits for destination backends
//!
//! - `StarRepository` - row-wise star loads, implemented by SQLite and PostgreSQL
//! - `TableCatalog` - read-only catalog and count queries used by the quality
//!   gate, implemented by every destination

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::types::{ArtistRow, PendingSongplay, SongRow, Table, TimeRow, UserRow};

/// Rows written by one source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileLoad {
    pub songs: u64,
    pub artists: u64,
    pub users: u64,
    pub time: u64,
    pub songplays: u64,
    /// Plays with no catalog match in the destination
    pub unmatched: u64,
}

impl FileLoad {
    /// Rows written to `table`
    pub fn rows(&self, table: Table) -> u64 {
        match table {
            Table::Songs => self.songs,
            Table::Artists => self.artists,
            Table::Users => self.users,
            Table::Time => self.time,
            Table::Songplays => self.songplays,
        }
    }
}

// ============================================================================
// Star Repository Trait
// ============================================================================

/// Row-wise star schema writes.
///
/// Each `load_*` call is one transaction: either every row of the file is
/// committed or none is.
#[async_trait]
pub trait StarRepository: Send + Sync {
    /// Empty every star table; songplay ids restart at 1
    async fn truncate_all(&self) -> Result<(), DataError>;

    /// Insert songs and artists from one song file; duplicates are ignored
    async fn load_song_file(
        &self,
        songs: &[SongRow],
        artists: &[ArtistRow],
    ) -> Result<FileLoad, DataError>;

    /// Insert time rows, upsert users and insert matched songplays from one
    /// log file. Each play is matched against the `songs`/`artists` tables
    /// already present in the destination.
    async fn load_log_file(
        &self,
        time: &[TimeRow],
        users: &[UserRow],
        plays: &[PendingSongplay],
    ) -> Result<FileLoad, DataError>;
}

// ============================================================================
// Table Catalog Trait
// ============================================================================

/// Catalog lookups and counts over the star tables
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Backend name for log and error context
    fn backend(&self) -> &'static str;

    /// Columns the destination declares NOT NULL, in schema order
    async fn not_null_columns(&self, table: Table) -> Result<Vec<String>, DataError>;

    async fn count_rows(&self, table: Table) -> Result<i64, DataError>;

    /// Rows of `table` where `column` is NULL
    async fn count_nulls(&self, table: Table, column: &str) -> Result<i64, DataError>;
}

/// Quoted column identifier, if `column` belongs to `table`
pub fn checked_column(table: Table, column: &str) -> Result<String, DataError> {
    if table.has_column(column) {
        Ok(format!("\"{}\"", column))
    } else {
        Err(DataError::UnknownColumn {
            table: table.name(),
            column: column.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_column() {
        assert_eq!(checked_column(Table::Time, "weekday").unwrap(), "\"weekday\"");
        let err = checked_column(Table::Users, "user_id; DROP TABLE users").unwrap_err();
        assert!(matches!(err, DataError::UnknownColumn { table: "users", .. }));
    }

    #[test]
    fn test_file_load_rows() {
        let load = FileLoad {
            songs: 1,
            artists: 1,
            songplays: 3,
            ..Default::default()
        };
        assert_eq!(load.rows(Table::Songplays), 3);
        assert_eq!(load.rows(Table::Users), 0);
    }
}
