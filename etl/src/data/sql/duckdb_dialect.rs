//! DuckDB SQL dialect implementation

use super::SqlDialect;

/// DuckDB SQL dialect
pub struct DuckdbDialect;

impl SqlDialect for DuckdbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn epoch_ms_to_timestamp(&self, col: &str) -> String {
        format!("epoch_ms({})", col)
    }

    fn weekday(&self, col: &str) -> String {
        format!("CAST(isodow({}) - 1 AS INTEGER)", col)
    }

    fn text_type(&self) -> &'static str {
        "VARCHAR"
    }

    fn double_type(&self) -> &'static str {
        "DOUBLE"
    }
}
