//! Per-run counters and the closing summary lines

use std::collections::BTreeMap;

use crate::data::FileLoad;
use crate::data::types::Table;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    rows: BTreeMap<Table, u64>,
    pub files_processed: usize,
    pub files_failed: usize,
    /// Events dropped for missing user fields or an invalid timestamp
    pub rejected: usize,
    /// Play events with no catalog match
    pub unmatched: usize,
}

impl RunSummary {
    pub fn add_rows(&mut self, table: Table, rows: u64) {
        *self.rows.entry(table).or_default() += rows;
    }

    /// Rows and unmatched plays of one committed file
    pub fn add_load(&mut self, load: &FileLoad) {
        for table in Table::STAR {
            self.add_rows(table, load.rows(table));
        }
        self.unmatched += load.unmatched as usize;
    }

    pub fn rows(&self, table: Table) -> u64 {
        self.rows.get(&table).copied().unwrap_or(0)
    }

    /// One line per star table, then the run counters
    pub fn log(&self, pipeline: &'static str) {
        for table in Table::STAR {
            tracing::info!(pipeline, table = %table, rows = self.rows(table), "Table summary");
        }
        tracing::info!(
            pipeline,
            files_processed = self.files_processed,
            files_failed = self.files_failed,
            rejected = self.rejected,
            unmatched = self.unmatched,
            "Run summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_load_accumulates() {
        let mut summary = RunSummary::default();
        let load = FileLoad {
            time: 2,
            users: 1,
            songplays: 1,
            unmatched: 1,
            ..Default::default()
        };
        summary.add_load(&load);
        summary.add_load(&load);

        assert_eq!(summary.rows(Table::Time), 4);
        assert_eq!(summary.rows(Table::Songplays), 2);
        assert_eq!(summary.rows(Table::Songs), 0);
        assert_eq!(summary.unmatched, 2);
    }
}
