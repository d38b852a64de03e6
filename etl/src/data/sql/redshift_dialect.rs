//! Redshift SQL dialect implementation

use super::SqlDialect;
use crate::data::types::Table;

/// Redshift SQL dialect
pub struct RedshiftDialect;

impl SqlDialect for RedshiftDialect {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn epoch_ms_to_timestamp(&self, col: &str) -> String {
        format!("TIMESTAMP 'epoch' + {} / 1000.0 * INTERVAL '1 second'", col)
    }

    fn weekday(&self, col: &str) -> String {
        format!("CAST((EXTRACT(dow FROM {}) + 6) % 7 AS INTEGER)", col)
    }

    fn text_type(&self) -> &'static str {
        "VARCHAR(1024)"
    }

    fn double_type(&self) -> &'static str {
        "DOUBLE PRECISION"
    }

    fn table_layout(&self, table: Table) -> &'static str {
        match table {
            Table::Songplays => " DISTKEY(song_id) SORTKEY(start_time)",
            Table::Songs => " DISTKEY(song_id) SORTKEY(song_id)",
            Table::Time => " DISTSTYLE ALL SORTKEY(start_time)",
            Table::Users | Table::Artists => " DISTSTYLE ALL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_shifts_sunday_to_six() {
        let d = RedshiftDialect;
        assert_eq!(
            d.weekday("start_time"),
            "CAST((EXTRACT(dow FROM start_time) + 6) % 7 AS INTEGER)"
        );
    }

    #[test]
    fn test_epoch_keeps_milliseconds() {
        let d = RedshiftDialect;
        assert!(d.epoch_ms_to_timestamp("e.ts").contains("/ 1000.0"));
    }
}
