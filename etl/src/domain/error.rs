//! Pipeline error type

use thiserror::Error;

use crate::data::DataError;
use crate::data::cluster::ClusterError;
use crate::data::source::SourceError;
use crate::data::warehouse::WarehouseError;

use super::quality::QualityReport;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),

    /// Listing the source failed, so no file could be visited
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("Quality checks failed: {0}")]
    Quality(QualityReport),

    /// Task names that failed, in run order
    #[error("{} task(s) failed: {}", .0.len(), .0.join(", "))]
    TasksFailed(Vec<String>),

    #[error("Interrupted by shutdown signal")]
    Interrupted,
}
