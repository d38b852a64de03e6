//! AWS cluster provider (Redshift, IAM, EC2)

use async_trait::async_trait;
use aws_sdk_ec2::error::ProvideErrorMetadata;

use crate::core::constants::REDSHIFT_SERVICE_PRINCIPAL;

use super::{ClusterError, ClusterInfo, ClusterProvider, ClusterSpec};

const DUPLICATE_PERMISSION: &str = "InvalidPermission.Duplicate";
const MISSING_PERMISSION: &str = "InvalidPermission.NotFound";

/// Trust policy letting the warehouse service assume the role
fn trust_policy() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": REDSHIFT_SERVICE_PRINCIPAL },
            "Action": "sts:AssumeRole"
        }]
    })
    .to_string()
}

pub struct AwsClusterProvider {
    redshift: aws_sdk_redshift::Client,
    iam: aws_sdk_iam::Client,
    ec2: aws_sdk_ec2::Client,
}

impl AwsClusterProvider {
    /// Build clients from the default AWS credential chain
    pub async fn new(region: Option<&str>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            config_loader = config_loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = config_loader.load().await;

        Self {
            redshift: aws_sdk_redshift::Client::new(&config),
            iam: aws_sdk_iam::Client::new(&config),
            ec2: aws_sdk_ec2::Client::new(&config),
        }
    }
}

#[async_trait]
impl ClusterProvider for AwsClusterProvider {
    async fn create_role(&self, role_name: &str) -> Result<String, ClusterError> {
        let created = self
            .iam
            .create_role()
            .role_name(role_name)
            .description("Allows the warehouse cluster to read from S3")
            .assume_role_policy_document(trust_policy())
            .send()
            .await;

        match created {
            Ok(resp) => resp
                .role()
                .map(|r| r.arn().to_string())
                .ok_or_else(|| ClusterError::api("CreateRole", "response without role")),
            Err(e) => {
                let service_err = e.into_service_error();
                if !service_err.is_entity_already_exists_exception() {
                    return Err(ClusterError::api("CreateRole", service_err));
                }
                tracing::info!(role = role_name, "IAM role already exists, reusing it");
                let resp = self
                    .iam
                    .get_role()
                    .role_name(role_name)
                    .send()
                    .await
                    .map_err(|e| ClusterError::api("GetRole", e.into_service_error()))?;
                resp.role()
                    .map(|r| r.arn().to_string())
                    .ok_or_else(|| ClusterError::api("GetRole", "response without role"))
            }
        }
    }

    async fn delete_role(&self, role_name: &str) -> Result<(), ClusterError> {
        match self.iam.delete_role().role_name(role_name).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    Ok(())
                } else {
                    Err(ClusterError::api("DeleteRole", service_err))
                }
            }
        }
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ClusterError> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| ClusterError::api("AttachRolePolicy", e.into_service_error()))?;
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ClusterError> {
        match self
            .iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    Ok(())
                } else {
                    Err(ClusterError::api("DetachRolePolicy", service_err))
                }
            }
        }
    }

    async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str) -> Result<(), ClusterError> {
        let mut request = self
            .redshift
            .create_cluster()
            .cluster_identifier(&spec.identifier)
            .cluster_type(&spec.cluster_type)
            .node_type(&spec.node_type)
            .db_name(&spec.db_name)
            .master_username(&spec.db_user)
            .master_user_password(&spec.db_password)
            .port(i32::from(spec.port))
            .iam_roles(role_arn);
        // The API rejects a node count for single-node clusters
        if !spec.is_single_node() {
            request = request.number_of_nodes(spec.num_nodes);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_cluster_already_exists_fault() {
                    tracing::info!(cluster = %spec.identifier, "Cluster already exists, reusing it");
                    Ok(())
                } else {
                    Err(ClusterError::api("CreateCluster", service_err))
                }
            }
        }
    }

    async fn delete_cluster(&self, identifier: &str) -> Result<(), ClusterError> {
        let deleted = self
            .redshift
            .delete_cluster()
            .cluster_identifier(identifier)
            .skip_final_cluster_snapshot(true)
            .send()
            .await;
        match deleted {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_cluster_not_found_fault() {
                    Ok(())
                } else if service_err.is_invalid_cluster_state_fault() {
                    // Already deleting; the caller waits for it to disappear
                    tracing::info!(cluster = identifier, "Cluster not deletable right now: {}", service_err);
                    Ok(())
                } else {
                    Err(ClusterError::api("DeleteCluster", service_err))
                }
            }
        }
    }

    async fn describe_cluster(&self, identifier: &str) -> Result<Option<ClusterInfo>, ClusterError> {
        let resp = match self
            .redshift
            .describe_clusters()
            .cluster_identifier(identifier)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_cluster_not_found_fault() {
                    return Ok(None);
                }
                return Err(ClusterError::api("DescribeClusters", service_err));
            }
        };

        Ok(resp.clusters().first().map(|c| ClusterInfo {
            identifier: c.cluster_identifier().unwrap_or(identifier).to_string(),
            status: c.cluster_status().unwrap_or_default().to_string(),
            endpoint: c
                .endpoint()
                .and_then(|e| e.address())
                .map(str::to_string),
            port: c
                .endpoint()
                .and_then(|e| e.port())
                .and_then(|p| u16::try_from(p).ok()),
            security_group_id: c
                .vpc_security_groups()
                .first()
                .and_then(|g| g.vpc_security_group_id())
                .map(str::to_string),
        }))
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        cidr: &str,
        port: u16,
    ) -> Result<(), ClusterError> {
        let result = self
            .ec2
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_protocol("tcp")
            .from_port(i32::from(port))
            .to_port(i32::from(port))
            .cidr_ip(cidr)
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.code() == Some(DUPLICATE_PERMISSION) {
                    Ok(())
                } else {
                    Err(ClusterError::api("AuthorizeSecurityGroupIngress", service_err))
                }
            }
        }
    }

    async fn revoke_ingress(
        &self,
        group_id: &str,
        cidr: &str,
        port: u16,
    ) -> Result<(), ClusterError> {
        let result = self
            .ec2
            .revoke_security_group_ingress()
            .group_id(group_id)
            .ip_protocol("tcp")
            .from_port(i32::from(port))
            .to_port(i32::from(port))
            .cidr_ip(cidr)
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.code() == Some(MISSING_PERMISSION) {
                    Ok(())
                } else {
                    Err(ClusterError::api("RevokeSecurityGroupIngress", service_err))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_policy_names_service() {
        let policy: serde_json::Value = serde_json::from_str(&trust_policy()).unwrap();
        assert_eq!(
            policy["Statement"][0]["Principal"]["Service"],
            REDSHIFT_SERVICE_PRINCIPAL
        );
        assert_eq!(policy["Statement"][0]["Action"], "sts:AssumeRole");
    }
}
