//! Compute cluster provisioning
//!
//! `ClusterProvider` is the seam between the lifecycle state machine in
//! `domain::provision` and a cloud API. Every `delete_*`/`revoke_*`/`detach_*`
//! call treats "not found" as success so teardown can be repeated.

mod aws;
pub mod error;

pub use aws::AwsClusterProvider;
pub use error::ClusterError;

use async_trait::async_trait;

/// Desired cluster shape and credentials
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    pub identifier: String,
    pub cluster_type: String,
    pub node_type: String,
    pub num_nodes: i32,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub port: u16,
    pub role_name: String,
    pub allowed_cidr: String,
}

impl ClusterSpec {
    pub fn is_single_node(&self) -> bool {
        self.cluster_type == "single-node"
    }
}

/// Observed cluster state as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterInfo {
    pub identifier: String,
    /// Provider status string, e.g. `creating`, `available`, `deleting`
    pub status: String,
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub security_group_id: Option<String>,
}

impl ClusterInfo {
    pub fn is_available(&self) -> bool {
        self.status == "available"
    }
}

#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Create the role the cluster assumes (trusting the warehouse service);
    /// returns its ARN. An existing role is reused.
    async fn create_role(&self, role_name: &str) -> Result<String, ClusterError>;

    async fn delete_role(&self, role_name: &str) -> Result<(), ClusterError>;

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ClusterError>;

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ClusterError>;

    /// Request a new cluster; returns once the request is accepted
    async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str) -> Result<(), ClusterError>;

    /// Request deletion without a final snapshot
    async fn delete_cluster(&self, identifier: &str) -> Result<(), ClusterError>;

    /// `None` once the cluster no longer exists
    async fn describe_cluster(&self, identifier: &str) -> Result<Option<ClusterInfo>, ClusterError>;

    async fn authorize_ingress(
        &self,
        group_id: &str,
        cidr: &str,
        port: u16,
    ) -> Result<(), ClusterError>;

    async fn revoke_ingress(&self, group_id: &str, cidr: &str, port: u16)
    -> Result<(), ClusterError>;
}
