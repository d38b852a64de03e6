//! Source reader error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path} at line {line}: {source}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Directory walk failed below {root}: {message}")]
    Walk { root: String, message: String },

    #[error("S3 error for s3://{bucket}/{key}: {message}")]
    S3 {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SourceError {
    pub fn s3(bucket: &str, key: &str, err: impl std::fmt::Display) -> Self {
        Self::S3 {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}
