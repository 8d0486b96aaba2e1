//! Cloud services the agents depend on
//!
//! The core only talks to AWS through these traits; `esherd-aws` provides
//! the SDK-backed implementations.

use crate::error::Result;
use crate::lifecycle::LifecycleAction;
use async_trait::async_trait;
use std::time::Duration;

/// Auto Scaling processes suspended while the cluster is unstable
pub const DEFAULT_SCALING_PROCESSES: &[&str] =
    &["Launch", "Terminate", "ReplaceUnhealthy", "AZRebalance"];

#[async_trait]
pub trait ScalingGroups: Send + Sync {
    /// Names of the processes currently suspended on `group`
    async fn suspended_processes(&self, group: &str) -> Result<Vec<String>>;

    async fn suspend_processes(&self, group: &str, processes: &[String]) -> Result<()>;

    async fn resume_processes(&self, group: &str, processes: &[String]) -> Result<()>;
}

/// Outcome reported when completing a lifecycle hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleResult {
    Continue,
}

impl LifecycleResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleResult::Continue => "CONTINUE",
        }
    }
}

#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Extend the hook timeout. An expired action is a `StateConflict`.
    async fn record_heartbeat(&self, action: &LifecycleAction) -> Result<()>;

    async fn complete(&self, action: &LifecycleAction, result: LifecycleResult) -> Result<()>;
}

/// A message received from the event queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    /// Handle used to extend visibility and acknowledge
    pub receipt: String,
    pub body: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Long-poll for the next batch; an empty batch is not an error
    async fn receive(&self) -> Result<Vec<QueueMessage>>;

    async fn extend_visibility(&self, message: &QueueMessage, timeout: Duration) -> Result<()>;

    /// Delete the message so it is not redelivered
    async fn ack(&self, message: &QueueMessage) -> Result<()>;
}

/// Compute instance description joined with node statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: String,
    pub vcpus: u32,
}

#[async_trait]
pub trait InstanceDescriber: Send + Sync {
    /// Describe the given instances; unknown IDs are omitted from the result
    async fn describe(&self, ids: &[String]) -> Result<Vec<InstanceInfo>>;
}

/// Deployment state of a container service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcsServiceState {
    pub num_deployments: usize,
}

#[async_trait]
pub trait ServiceDeployments: Send + Sync {
    async fn service_state(&self, cluster: &str, service: &str) -> Result<EcsServiceState>;
}
