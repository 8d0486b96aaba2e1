//! ECS service deployment state

use crate::{cloud_error, cloud_ok};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecs::Client;
use esherd::cloud::{EcsServiceState, ServiceDeployments};
use esherd::{Error, Result};

#[derive(Clone)]
pub struct EcsServices {
    client: Client,
}

impl EcsServices {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ServiceDeployments for EcsServices {
    async fn service_state(&self, cluster: &str, service: &str) -> Result<EcsServiceState> {
        let output = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| cloud_error("DescribeServices", e))?;
        cloud_ok("DescribeServices");

        let found = output
            .services()
            .first()
            .ok_or_else(|| Error::Cloud(format!("ECS service {}/{} not found", cluster, service)))?;
        Ok(EcsServiceState {
            num_deployments: found.deployments().len(),
        })
    }
}
