//! Warehouse destinations
//!
//! A warehouse lands raw records in the staging tables, then fills the star
//! tables with `INSERT ... SELECT` transforms from `data::sql::transforms`.
//!
//! - `duckdb` - local DuckDB file, staged through the source readers
//! - `redshift` - Redshift cluster, staged with `COPY ... FORMAT AS JSON`

mod duckdb;
mod redshift;

pub use self::duckdb::DuckdbWarehouse;
pub use self::redshift::{CopySettings, RedshiftWarehouse};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::data::error::DataError;
use crate::data::sql::LoadMode;
use crate::data::traits::TableCatalog;
use crate::data::types::{StagingTable, Table};
use crate::utils::location::join_key;

#[derive(Error, Debug)]
pub enum WarehouseError {
    /// A statement against one table failed
    #[error("{table}: {source}")]
    Table {
        table: &'static str,
        #[source]
        source: DataError,
    },

    #[error(transparent)]
    Data(#[from] DataError),
}

impl WarehouseError {
    /// Attach the table a failing statement targeted
    pub fn on(table: &'static str) -> impl FnOnce(DataError) -> Self {
        move |source| Self::Table { table, source }
    }
}

/// Result of loading one staging table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOutcome {
    pub rows: u64,
    pub files_read: usize,
    pub files_failed: usize,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Target name for log context
    fn target(&self) -> &'static str;

    /// Catalog queries over the star tables, used by the quality gate
    fn catalog(&self) -> &dyn TableCatalog;

    /// Create staging and star tables if missing
    async fn create_tables(&self) -> Result<(), WarehouseError>;

    /// Replace the contents of a staging table. With `date`, only that day's
    /// log files are staged.
    async fn stage(
        &self,
        table: StagingTable,
        date: Option<NaiveDate>,
    ) -> Result<StageOutcome, WarehouseError>;

    /// Fill `table` from staging; returns rows inserted
    async fn load(&self, table: Table, mode: LoadMode) -> Result<u64, WarehouseError>;

    async fn close(&self) -> Result<(), WarehouseError>;
}

/// Key prefix of the log files of one day: `{log_prefix}/{YYYY}/{MM}/{YYYY-MM-DD}`
pub fn day_prefix(log_prefix: &str, date: NaiveDate) -> String {
    join_key(
        log_prefix,
        &format!(
            "{}/{:02}/{}",
            date.year(),
            date.month(),
            date.format("%Y-%m-%d")
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_prefix() {
        let date = NaiveDate::from_ymd_opt(2018, 11, 2).unwrap();
        assert_eq!(
            day_prefix("log_data/", date),
            "log_data/2018/11/2018-11-02"
        );
    }

    #[test]
    fn test_table_context_in_message() {
        let err = WarehouseError::on("songplays")(DataError::timeout("redshift", 300));
        assert_eq!(err.to_string(), "songplays: Query timeout after 300s on redshift");
    }
}
