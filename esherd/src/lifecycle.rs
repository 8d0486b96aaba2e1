//! Auto Scaling lifecycle actions

use crate::error::{Error, Result};
use crate::events::LifecycleHookDetail;
use chrono::{DateTime, Utc};

pub const TERMINATING_TRANSITION: &str = "autoscaling:EC2_INSTANCE_TERMINATING";
pub const LAUNCHING_TRANSITION: &str = "autoscaling:EC2_INSTANCE_LAUNCHING";

/// A paused instance termination awaiting completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleAction {
    pub group: String,
    pub hook_name: String,
    pub token: String,
    pub instance_id: String,
    pub transition: String,
    /// When the hook fired, taken from the event envelope
    pub start: DateTime<Utc>,
    pub heartbeats: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl LifecycleAction {
    /// Only termination hooks drain a node
    pub fn from_detail(detail: &LifecycleHookDetail, start: DateTime<Utc>) -> Result<Self> {
        if detail.lifecycle_transition != TERMINATING_TRANSITION {
            return Err(Error::UnexpectedEvent(format!(
                "lifecycle transition {} for {}",
                detail.lifecycle_transition, detail.ec2_instance_id
            )));
        }
        if detail.ec2_instance_id.is_empty() {
            return Err(Error::Validation("lifecycle action without instance ID".into()));
        }
        Ok(Self {
            group: detail.auto_scaling_group_name.clone(),
            hook_name: detail.lifecycle_hook_name.clone(),
            token: detail.lifecycle_action_token.clone(),
            instance_id: detail.ec2_instance_id.clone(),
            transition: detail.lifecycle_transition.clone(),
            start,
            heartbeats: 0,
            last_heartbeat: None,
        })
    }

    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        self.heartbeats += 1;
        self.last_heartbeat = Some(at);
    }

    /// Time since the hook fired
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.start
    }
}
