//! Cluster lifecycle
//!
//! ```text
//! absent -> creating -> available -> network_opened -> in_use
//!        -> network_closed -> deleting -> absent
//! ```
//!
//! Setup records every completed step. When a later step fails, the recorded
//! steps are undone in reverse order; an undo failure is logged and the
//! remaining undos still run.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::config::ClusterConfig;
use crate::core::constants::{CLUSTER_POLL_INTERVAL_SECS, S3_READ_ONLY_POLICY_ARN};
use crate::data::cluster::{ClusterError, ClusterInfo, ClusterProvider, ClusterSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Absent,
    Creating,
    Available,
    NetworkOpened,
    InUse,
    NetworkClosed,
    Deleting,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClusterState::Absent => "absent",
            ClusterState::Creating => "creating",
            ClusterState::Available => "available",
            ClusterState::NetworkOpened => "network_opened",
            ClusterState::InUse => "in_use",
            ClusterState::NetworkClosed => "network_closed",
            ClusterState::Deleting => "deleting",
        })
    }
}

/// Cluster shape from config; the master password must be set
pub fn cluster_spec(config: &ClusterConfig) -> Result<ClusterSpec, ClusterError> {
    let db_password = config
        .db_password
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ClusterError::Config("cluster.db_password is not set".to_string()))?;
    Ok(spec_with_password(config, db_password))
}

/// Cluster shape for status and teardown, which never use the password
pub fn lookup_spec(config: &ClusterConfig) -> ClusterSpec {
    spec_with_password(config, String::new())
}

fn spec_with_password(config: &ClusterConfig, db_password: String) -> ClusterSpec {
    ClusterSpec {
        identifier: config.identifier.clone(),
        cluster_type: config.cluster_type.clone(),
        node_type: config.node_type.clone(),
        num_nodes: config.num_nodes,
        db_name: config.db_name.clone(),
        db_user: config.db_user.clone(),
        db_password,
        port: config.port,
        role_name: config.role_name.clone(),
        allowed_cidr: config.allowed_cidr.clone(),
    }
}

/// Connection URL of a provisioned cluster
pub fn redshift_url(spec: &ClusterSpec, host: &str, port: u16) -> String {
    format!(
        "postgres://{}:{}@{}:{}/{}",
        urlencoding::encode(&spec.db_user),
        urlencoding::encode(&spec.db_password),
        host,
        port,
        spec.db_name
    )
}

/// A cluster ready to accept connections
#[derive(Clone)]
pub struct ClusterHandle {
    pub identifier: String,
    pub endpoint: String,
    pub port: u16,
    /// Role the cluster assumes for COPY
    pub role_arn: String,
    pub url: String,
}

/// Completed setup steps, undone in reverse
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Role,
    Policy,
    Cluster,
    Ingress(String),
}

pub struct Provisioner<'a> {
    provider: &'a dyn ClusterProvider,
    spec: ClusterSpec,
    wait_timeout: Duration,
    poll_interval: Duration,
    state: ClusterState,
}

impl<'a> Provisioner<'a> {
    pub fn new(provider: &'a dyn ClusterProvider, spec: ClusterSpec, wait_timeout_secs: u64) -> Self {
        Self {
            provider,
            spec,
            wait_timeout: Duration::from_secs(wait_timeout_secs),
            poll_interval: Duration::from_secs(CLUSTER_POLL_INTERVAL_SECS),
            state: ClusterState::Absent,
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    fn transition(&mut self, to: ClusterState) {
        tracing::info!(
            cluster = %self.spec.identifier,
            from = %self.state,
            to = %to,
            "Cluster state changed"
        );
        self.state = to;
    }

    /// The warehouse run has started against the cluster
    pub fn mark_in_use(&mut self) {
        self.transition(ClusterState::InUse);
    }

    /// Create role, policy attachment, cluster and ingress rule
    pub async fn up(&mut self) -> Result<ClusterHandle, ClusterError> {
        let mut done = Vec::new();
        match self.setup(&mut done).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                tracing::error!(cluster = %self.spec.identifier, error = %e, "Cluster setup failed, undoing completed steps");
                self.unwind(done).await;
                Err(e)
            }
        }
    }

    async fn setup(&mut self, done: &mut Vec<Step>) -> Result<ClusterHandle, ClusterError> {
        let role_arn = self.provider.create_role(&self.spec.role_name).await?;
        done.push(Step::Role);
        tracing::info!(role = %self.spec.role_name, arn = %role_arn, "Role ready");

        self.provider
            .attach_policy(&self.spec.role_name, S3_READ_ONLY_POLICY_ARN)
            .await?;
        done.push(Step::Policy);

        self.provider.create_cluster(&self.spec, &role_arn).await?;
        done.push(Step::Cluster);
        self.transition(ClusterState::Creating);

        let info = self
            .wait_for("available", |info| info.is_some_and(ClusterInfo::is_available))
            .await?
            .ok_or_else(|| self.missing("description"))?;
        self.transition(ClusterState::Available);

        let group_id = info
            .security_group_id
            .clone()
            .ok_or_else(|| self.missing("security group"))?;
        self.provider
            .authorize_ingress(&group_id, &self.spec.allowed_cidr, self.spec.port)
            .await?;
        done.push(Step::Ingress(group_id));
        self.transition(ClusterState::NetworkOpened);

        let endpoint = info.endpoint.clone().ok_or_else(|| self.missing("endpoint"))?;
        let port = info.port.unwrap_or(self.spec.port);
        tracing::info!(cluster = %self.spec.identifier, endpoint = %endpoint, port, "Cluster available");

        Ok(ClusterHandle {
            identifier: self.spec.identifier.clone(),
            url: redshift_url(&self.spec, &endpoint, port),
            endpoint,
            port,
            role_arn,
        })
    }

    async fn unwind(&mut self, done: Vec<Step>) {
        for step in done.into_iter().rev() {
            let result = match &step {
                Step::Ingress(group_id) => {
                    let result = self
                        .provider
                        .revoke_ingress(group_id, &self.spec.allowed_cidr, self.spec.port)
                        .await;
                    if result.is_ok() {
                        self.transition(ClusterState::NetworkClosed);
                    }
                    result
                }
                Step::Cluster => self.delete_cluster().await,
                Step::Policy => {
                    self.provider
                        .detach_policy(&self.spec.role_name, S3_READ_ONLY_POLICY_ARN)
                        .await
                }
                Step::Role => self.provider.delete_role(&self.spec.role_name).await,
            };
            if let Err(e) = result {
                tracing::warn!(step = ?step, error = %e, "Undo step failed, continuing");
            }
        }
    }

    /// Delete ingress rule, cluster, policy attachment and role. Every step
    /// runs; the first error is returned afterwards.
    pub async fn down(&mut self) -> Result<(), ClusterError> {
        let mut first_error = None;

        match self.provider.describe_cluster(&self.spec.identifier).await {
            Ok(Some(info)) => {
                if let Some(group_id) = info.security_group_id.as_deref() {
                    let revoked = self
                        .provider
                        .revoke_ingress(group_id, &self.spec.allowed_cidr, self.spec.port)
                        .await;
                    if revoked.is_ok() {
                        self.transition(ClusterState::NetworkClosed);
                    }
                    note(revoked, "revoke_ingress", &mut first_error);
                }
                let deleted = self.delete_cluster().await;
                note(deleted, "delete_cluster", &mut first_error);
            }
            Ok(None) => {
                tracing::info!(cluster = %self.spec.identifier, "Cluster not found, nothing to delete");
            }
            Err(e) => note(Err(e), "describe_cluster", &mut first_error),
        }

        let detached = self
            .provider
            .detach_policy(&self.spec.role_name, S3_READ_ONLY_POLICY_ARN)
            .await;
        note(detached, "detach_policy", &mut first_error);
        let deleted = self.provider.delete_role(&self.spec.role_name).await;
        note(deleted, "delete_role", &mut first_error);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn status(&self) -> Result<Option<ClusterInfo>, ClusterError> {
        self.provider.describe_cluster(&self.spec.identifier).await
    }

    async fn delete_cluster(&mut self) -> Result<(), ClusterError> {
        self.provider.delete_cluster(&self.spec.identifier).await?;
        self.transition(ClusterState::Deleting);
        self.wait_for("deleted", |info| info.is_none()).await?;
        self.transition(ClusterState::Absent);
        Ok(())
    }

    /// Poll the cluster until `reached` holds or the wait timeout passes
    async fn wait_for<F>(&self, target: &'static str, reached: F) -> Result<Option<ClusterInfo>, ClusterError>
    where
        F: Fn(Option<&ClusterInfo>) -> bool,
    {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            let info = self.provider.describe_cluster(&self.spec.identifier).await?;
            if reached(info.as_ref()) {
                return Ok(info);
            }
            let last_status = info.map(|i| i.status).unwrap_or_else(|| "absent".to_string());
            if Instant::now() >= deadline {
                return Err(ClusterError::Timeout {
                    identifier: self.spec.identifier.clone(),
                    target,
                    waited_secs: self.wait_timeout.as_secs(),
                    last_status,
                });
            }
            tracing::debug!(cluster = %self.spec.identifier, status = %last_status, target, "Waiting for cluster");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn missing(&self, field: &'static str) -> ClusterError {
        ClusterError::Missing {
            identifier: self.spec.identifier.clone(),
            field,
        }
    }
}

fn note(result: Result<(), ClusterError>, step: &'static str, first_error: &mut Option<ClusterError>) {
    if let Err(e) = result {
        tracing::warn!(step, error = %e, "Teardown step failed, continuing");
        first_error.get_or_insert(e);
    }
}
