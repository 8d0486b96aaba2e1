//! Typed event details

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded `detail` of a CloudWatch event
#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    LifecycleAction(LifecycleHookDetail),
    SpotInterruption(SpotInterruptionDetail),
    InstanceStateChange(InstanceStateChangeDetail),
    /// Any `(source, detail-type)` pair without a registered shape
    Generic(Map<String, Value>),
}

impl Detail {
    pub fn kind(&self) -> &'static str {
        match self {
            Detail::LifecycleAction(_) => "lifecycle_action",
            Detail::SpotInterruption(_) => "spot_interruption",
            Detail::InstanceStateChange(_) => "instance_state_change",
            Detail::Generic(_) => "generic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleHookDetail {
    #[serde(rename = "LifecycleActionToken")]
    pub lifecycle_action_token: String,
    #[serde(rename = "AutoScalingGroupName")]
    pub auto_scaling_group_name: String,
    #[serde(rename = "LifecycleHookName")]
    pub lifecycle_hook_name: String,
    #[serde(rename = "EC2InstanceId", alias = "EC2InstanceID")]
    pub ec2_instance_id: String,
    #[serde(rename = "LifecycleTransition")]
    pub lifecycle_transition: String,
    #[serde(rename = "NotificationMetadata", default)]
    pub notification_metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotInterruptionDetail {
    #[serde(rename = "instance-id")]
    pub instance_id: String,
    /// `terminate`, `stop` or `hibernate`
    #[serde(rename = "instance-action", default)]
    pub instance_action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStateChangeDetail {
    #[serde(rename = "instance-id")]
    pub instance_id: String,
    pub state: String,
}
