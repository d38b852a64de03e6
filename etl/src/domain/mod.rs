//! Pipelines over the star schema
//!
//! - `extract`, `facts` - row-set extraction and song-play matching
//! - `pipeline` - row-wise loader (SQLite / PostgreSQL)
//! - `lake` - bulk Parquet export
//! - `dag` - warehouse staging + transform task graph
//! - `provision` - compute cluster lifecycle
//! - `quality` - post-load data checks

pub mod dag;
pub mod error;
pub mod extract;
pub mod facts;
pub mod lake;
pub mod pipeline;
pub mod provision;
pub mod quality;
pub mod summary;

#[cfg(test)]
pub(crate) mod fixtures;

pub use dag::{DagOptions, WarehouseDag};
pub use error::PipelineError;
pub use lake::LakePipeline;
pub use pipeline::LoadPipeline;
pub use provision::Provisioner;
pub use summary::RunSummary;
