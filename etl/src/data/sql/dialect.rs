//! SQL dialect trait for warehouse transforms
//!
//! The staging-to-star transforms are written once; dialects supply the
//! few expressions and types that differ between engines.

use crate::data::types::Table;

/// SQL dialect trait for generating warehouse-specific SQL
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Convert an epoch-milliseconds column to a UTC TIMESTAMP
    ///
    /// - DuckDB: `epoch_ms(col)`
    /// - Redshift: `TIMESTAMP 'epoch' + col / 1000.0 * INTERVAL '1 second'`
    fn epoch_ms_to_timestamp(&self, col: &str) -> String;

    /// ISO-8601 week number of a timestamp
    fn iso_week(&self, col: &str) -> String {
        format!("CAST(EXTRACT(week FROM {}) AS INTEGER)", col)
    }

    /// Day of week with 0 = Monday .. 6 = Sunday
    ///
    /// - DuckDB: `isodow(col) - 1`
    /// - Redshift: `(EXTRACT(dow FROM col) + 6) % 7`
    fn weekday(&self, col: &str) -> String;

    /// Column type for free text
    fn text_type(&self) -> &'static str;

    /// Column type for floating point values
    fn double_type(&self) -> &'static str;

    /// Physical layout clause appended to a star table's DDL
    fn table_layout(&self, _table: Table) -> &'static str {
        ""
    }
}
