//! Post-load quality gate
//!
//! Read-only checks over the star tables: every table holds at least one
//! row, and no column the destination declares NOT NULL holds a NULL. All
//! checks run; failures are collected and reported together.

use std::fmt;

use crate::data::DataError;
use crate::data::TableCatalog;
use crate::data::types::Table;

use super::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    Empty { table: Table },
    Nulls { table: Table, column: String, count: i64 },
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckFailure::Empty { table } => write!(f, "{} has no rows", table),
            CheckFailure::Nulls {
                table,
                column,
                count,
            } => write!(f, "{}.{} has {} NULL value(s)", table, column, count),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    /// Checks executed
    pub checks: usize,
    pub failures: Vec<CheckFailure>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Err` carrying the report when any check failed
    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(PipelineError::Quality(self))
        }
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} checks failed", self.failures.len(), self.checks)?;
        for (i, failure) in self.failures.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { ": " } else { "; " }, failure)?;
        }
        Ok(())
    }
}

/// Run every check against `catalog`. Query errors abort the gate; failed
/// checks do not.
pub async fn run_checks(catalog: &dyn TableCatalog) -> Result<QualityReport, DataError> {
    let mut report = QualityReport::default();

    for table in Table::STAR {
        report.checks += 1;
        let rows = catalog.count_rows(table).await?;
        if rows == 0 {
            tracing::error!(backend = catalog.backend(), table = %table, "Quality check failed: no rows");
            report.failures.push(CheckFailure::Empty { table });
        }

        for column in catalog.not_null_columns(table).await? {
            report.checks += 1;
            let count = catalog.count_nulls(table, &column).await?;
            if count > 0 {
                tracing::error!(
                    backend = catalog.backend(),
                    table = %table,
                    column = %column,
                    nulls = count,
                    "Quality check failed: NULL in NOT NULL column"
                );
                report.failures.push(CheckFailure::Nulls {
                    table,
                    column,
                    count,
                });
            }
        }
    }

    if report.passed() {
        tracing::info!(backend = catalog.backend(), checks = report.checks, "Quality checks passed");
    }
    Ok(report)
}

/// Run the gate and turn failed checks into an error
pub async fn enforce(catalog: &dyn TableCatalog) -> Result<QualityReport, PipelineError> {
    run_checks(catalog).await?.into_result()
}
