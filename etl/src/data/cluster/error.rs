//! Cluster provisioning error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    /// A provider API call failed
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("Cluster {identifier} did not reach {target} within {waited_secs}s (last status: {last_status})")]
    Timeout {
        identifier: String,
        target: &'static str,
        waited_secs: u64,
        last_status: String,
    },

    /// The provider answered without a field the lifecycle needs
    #[error("Cluster {identifier} has no {field}")]
    Missing {
        identifier: String,
        field: &'static str,
    },

    #[error("Invalid cluster configuration: {0}")]
    Config(String),
}

impl ClusterError {
    pub fn api(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Api {
            operation,
            message: err.to_string(),
        }
    }
}
