//! Auto Scaling groups and lifecycle hooks

use crate::{cloud_error, cloud_ok};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_autoscaling::Client;
use esherd::cloud::{LifecycleHooks, LifecycleResult, ScalingGroups};
use esherd::{Error, LifecycleAction, Result};
use tracing::debug;

#[derive(Clone)]
pub struct AutoScalingClient {
    client: Client,
}

impl AutoScalingClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ScalingGroups for AutoScalingClient {
    async fn suspended_processes(&self, group: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(group)
            .send()
            .await
            .map_err(|e| cloud_error("DescribeAutoScalingGroups", e))?;
        cloud_ok("DescribeAutoScalingGroups");

        let found = output
            .auto_scaling_groups()
            .iter()
            .find(|g| g.auto_scaling_group_name() == Some(group))
            .ok_or_else(|| Error::Cloud(format!("auto scaling group {} not found", group)))?;

        Ok(found
            .suspended_processes()
            .iter()
            .filter_map(|p| p.process_name())
            .map(String::from)
            .collect())
    }

    async fn suspend_processes(&self, group: &str, processes: &[String]) -> Result<()> {
        self.client
            .suspend_processes()
            .auto_scaling_group_name(group)
            .set_scaling_processes(Some(processes.to_vec()))
            .send()
            .await
            .map_err(|e| cloud_error("SuspendProcesses", e))?;
        cloud_ok("SuspendProcesses");
        Ok(())
    }

    async fn resume_processes(&self, group: &str, processes: &[String]) -> Result<()> {
        self.client
            .resume_processes()
            .auto_scaling_group_name(group)
            .set_scaling_processes(Some(processes.to_vec()))
            .send()
            .await
            .map_err(|e| cloud_error("ResumeProcesses", e))?;
        cloud_ok("ResumeProcesses");
        Ok(())
    }
}

#[async_trait]
impl LifecycleHooks for AutoScalingClient {
    async fn record_heartbeat(&self, action: &LifecycleAction) -> Result<()> {
        self.client
            .record_lifecycle_action_heartbeat()
            .auto_scaling_group_name(&action.group)
            .lifecycle_hook_name(&action.hook_name)
            .lifecycle_action_token(&action.token)
            .instance_id(&action.instance_id)
            .send()
            .await
            .map_err(|e| cloud_error("RecordLifecycleActionHeartbeat", e))?;
        cloud_ok("RecordLifecycleActionHeartbeat");
        debug!(instance_id = %action.instance_id, "lifecycle heartbeat sent");
        Ok(())
    }

    async fn complete(&self, action: &LifecycleAction, result: LifecycleResult) -> Result<()> {
        self.client
            .complete_lifecycle_action()
            .auto_scaling_group_name(&action.group)
            .lifecycle_hook_name(&action.hook_name)
            .lifecycle_action_token(&action.token)
            .instance_id(&action.instance_id)
            .lifecycle_action_result(result.as_str())
            .send()
            .await
            .map_err(|e| cloud_error("CompleteLifecycleAction", e))?;
        cloud_ok("CompleteLifecycleAction");
        Ok(())
    }
}
