//! SQL generation for the warehouse
//!
//! - `dialect` - expressions that differ between DuckDB and Redshift
//! - `transforms` - DDL and `INSERT ... SELECT` statements from staging to star

mod dialect;
mod duckdb_dialect;
mod redshift_dialect;
pub mod transforms;

pub use dialect::SqlDialect;
pub use duckdb_dialect::DuckdbDialect;
pub use redshift_dialect::RedshiftDialect;

/// How a load task treats rows already in the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Delete every row, then insert (one transaction)
    Replace,
    /// Insert rows whose natural key is not present yet
    Append,
}

impl LoadMode {
    pub fn from_append(append: bool) -> Self {
        if append { Self::Append } else { Self::Replace }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
