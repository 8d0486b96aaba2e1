//! `(source, detail-type)` → detail constructor lookup

use super::detail::{Detail, InstanceStateChangeDetail, LifecycleHookDetail, SpotInterruptionDetail};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Builds a typed detail from the raw `detail` object
pub type DetailConstructor = fn(Value) -> Result<Detail>;

static GLOBAL: OnceLock<EventRegistry> = OnceLock::new();

pub struct EventRegistry {
    constructors: RwLock<HashMap<(String, String), DetailConstructor>>,
}

impl EventRegistry {
    /// Registry without any shapes; everything decodes as generic
    pub fn empty() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the Auto Scaling and EC2 shapes the agents consume
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register(
            "aws.autoscaling",
            "EC2 Instance-terminate Lifecycle Action",
            lifecycle_action,
        );
        registry.register(
            "aws.autoscaling",
            "EC2 Instance-launch Lifecycle Action",
            lifecycle_action,
        );
        registry.register(
            "aws.ec2",
            "EC2 Spot Instance Interruption Warning",
            spot_interruption,
        );
        registry.register(
            "aws.ec2",
            "EC2 Instance State-change Notification",
            instance_state_change,
        );
        registry
    }

    /// Add or replace the constructor for a pair
    pub fn register(&self, source: &str, detail_type: &str, constructor: DetailConstructor) {
        self.constructors
            .write()
            .insert((source.to_string(), detail_type.to_string()), constructor);
    }

    pub fn is_registered(&self, source: &str, detail_type: &str) -> bool {
        self.constructors
            .read()
            .contains_key(&(source.to_string(), detail_type.to_string()))
    }

    pub fn decode_detail(&self, source: &str, detail_type: &str, detail: Value) -> Result<Detail> {
        let constructor = self
            .constructors
            .read()
            .get(&(source.to_string(), detail_type.to_string()))
            .copied();
        match constructor {
            Some(build) => build(detail),
            None => generic(detail),
        }
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Process-wide registry, initialised with the default shapes on first use
pub fn global() -> &'static EventRegistry {
    GLOBAL.get_or_init(EventRegistry::with_defaults)
}

fn lifecycle_action(detail: Value) -> Result<Detail> {
    let detail: LifecycleHookDetail = serde_json::from_value(detail)
        .map_err(|e| Error::InvalidCloudWatchEvent(format!("lifecycle action detail: {}", e)))?;
    Ok(Detail::LifecycleAction(detail))
}

fn spot_interruption(detail: Value) -> Result<Detail> {
    let detail: SpotInterruptionDetail = serde_json::from_value(detail)
        .map_err(|e| Error::InvalidCloudWatchEvent(format!("spot interruption detail: {}", e)))?;
    Ok(Detail::SpotInterruption(detail))
}

fn instance_state_change(detail: Value) -> Result<Detail> {
    let detail: InstanceStateChangeDetail = serde_json::from_value(detail)
        .map_err(|e| Error::InvalidCloudWatchEvent(format!("state change detail: {}", e)))?;
    Ok(Detail::InstanceStateChange(detail))
}

fn generic(detail: Value) -> Result<Detail> {
    match detail {
        Value::Object(map) => Ok(Detail::Generic(map)),
        Value::Null => Ok(Detail::Generic(Map::new())),
        other => Err(Error::InvalidCloudWatchEvent(format!(
            "detail is not an object: {}",
            other
        ))),
    }
}
