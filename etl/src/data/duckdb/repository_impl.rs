//! `TableCatalog` implementation for DuckDB
//!
//! Implemented for `Arc<DuckdbService>` because the connection guard is not
//! `Send`: the Arc is cloned into the blocking closure and the guard is
//! taken there.

use std::sync::Arc;

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::traits::{TableCatalog, checked_column};
use crate::data::types::Table;

use super::DuckdbService;
use super::repositories::catalog;

#[async_trait]
impl TableCatalog for Arc<DuckdbService> {
    fn backend(&self) -> &'static str {
        "duckdb"
    }

    async fn not_null_columns(&self, table: Table) -> Result<Vec<String>, DataError> {
        self.with_conn(move |conn| catalog::not_null_columns(conn, table))
            .await
            .map_err(Into::into)
    }

    async fn count_rows(&self, table: Table) -> Result<i64, DataError> {
        self.with_conn(move |conn| catalog::count_rows(conn, table))
            .await
            .map_err(Into::into)
    }

    async fn count_nulls(&self, table: Table, column: &str) -> Result<i64, DataError> {
        let column = checked_column(table, column)?;
        self.with_conn(move |conn| catalog::count_nulls(conn, table, &column))
            .await
            .map_err(Into::into)
    }
}
