//! CloudWatch / EventBridge event decoding
//!
//! The envelope is fixed; the shape of `detail` depends on the
//! `(source, detail-type)` pair and is resolved through an
//! [`EventRegistry`]. Pairs nobody registered decode as [`Detail::Generic`].

pub mod detail;
pub mod registry;

pub use detail::{
    Detail, InstanceStateChangeDetail, LifecycleHookDetail, SpotInterruptionDetail,
};
pub use registry::{global, DetailConstructor, EventRegistry};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct CloudWatchEvent {
    pub version: String,
    pub id: String,
    pub detail_type: String,
    pub source: String,
    pub account: String,
    pub time: Option<DateTime<Utc>>,
    pub region: String,
    pub resources: Vec<String>,
    pub detail: Detail,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    version: String,
    #[serde(default)]
    id: String,
    #[serde(rename = "detail-type")]
    detail_type: Option<String>,
    source: Option<String>,
    #[serde(default)]
    account: String,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    region: String,
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    detail: Value,
}

impl CloudWatchEvent {
    /// Decode with the process-wide registry
    pub fn decode(body: &str) -> Result<Self> {
        Self::decode_with(global(), body)
    }

    pub fn decode_with(registry: &EventRegistry, body: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(body)
            .map_err(|e| Error::InvalidCloudWatchEvent(e.to_string()))?;

        let source = envelope
            .source
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidCloudWatchEvent("missing source".into()))?;
        let detail_type = envelope
            .detail_type
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidCloudWatchEvent("missing detail-type".into()))?;

        let detail = registry.decode_detail(&source, &detail_type, envelope.detail)?;

        Ok(Self {
            version: envelope.version,
            id: envelope.id,
            detail_type,
            source,
            account: envelope.account,
            time: envelope.time,
            region: envelope.region,
            resources: envelope.resources,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spot_body() -> String {
        json!({
            "version": "0",
            "id": "1e5527d7-bb36-4607-3370-4164db56a40e",
            "detail-type": "EC2 Spot Instance Interruption Warning",
            "source": "aws.ec2",
            "account": "123456789012",
            "time": "2024-02-01T12:00:00Z",
            "region": "eu-west-1",
            "resources": ["arn:aws:ec2:eu-west-1b:instance/i-1234567890abcdef0"],
            "detail": {
                "instance-id": "i-1234567890abcdef0",
                "instance-action": "terminate"
            }
        })
        .to_string()
    }

    #[test]
    fn test_decode_spot_interruption() {
        let event = CloudWatchEvent::decode(&spot_body()).unwrap();
        assert_eq!(event.source, "aws.ec2");
        assert_eq!(event.region, "eu-west-1");
        assert_eq!(event.resources.len(), 1);
        assert!(event.time.is_some());
        match event.detail {
            Detail::SpotInterruption(d) => {
                assert_eq!(d.instance_id, "i-1234567890abcdef0");
                assert_eq!(d.instance_action, "terminate");
            }
            other => panic!("expected spot interruption, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_lifecycle_action() {
        let body = json!({
            "version": "0",
            "id": "12345678",
            "detail-type": "EC2 Instance-terminate Lifecycle Action",
            "source": "aws.autoscaling",
            "account": "123456789012",
            "time": "2024-02-01T12:00:00Z",
            "region": "us-west-2",
            "resources": [],
            "detail": {
                "LifecycleActionToken": "87654321-4321-4321-4321-210987654321",
                "AutoScalingGroupName": "es-data",
                "LifecycleHookName": "drain-hook",
                "EC2InstanceId": "i-1234567890abcdef0",
                "LifecycleTransition": "autoscaling:EC2_INSTANCE_TERMINATING",
                "NotificationMetadata": "additional-info"
            }
        })
        .to_string();

        let event = CloudWatchEvent::decode(&body).unwrap();
        match event.detail {
            Detail::LifecycleAction(d) => {
                assert_eq!(d.auto_scaling_group_name, "es-data");
                assert_eq!(d.ec2_instance_id, "i-1234567890abcdef0");
                assert_eq!(d.notification_metadata.as_deref(), Some("additional-info"));
            }
            other => panic!("expected lifecycle action, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_source_is_invalid() {
        let body = json!({"detail-type": "Scheduled Event", "detail": {}}).to_string();
        let err = CloudWatchEvent::decode(&body).unwrap_err();
        assert!(matches!(err, Error::InvalidCloudWatchEvent(_)));
    }

    #[test]
    fn test_missing_detail_type_is_invalid() {
        let body = json!({"source": "aws.ec2", "detail": {}}).to_string();
        let err = CloudWatchEvent::decode(&body).unwrap_err();
        assert!(matches!(err, Error::InvalidCloudWatchEvent(_)));
    }

    #[test]
    fn test_not_json_is_invalid() {
        let err = CloudWatchEvent::decode("hello").unwrap_err();
        assert!(matches!(err, Error::InvalidCloudWatchEvent(_)));
    }

    #[test]
    fn test_unregistered_pair_keeps_generic_detail() {
        let body = json!({
            "source": "aws.events",
            "detail-type": "Scheduled Event",
            "detail": {"schedule": "hourly"}
        })
        .to_string();
        let event = CloudWatchEvent::decode(&body).unwrap();
        assert_eq!(event.detail.kind(), "generic");
    }

    #[test]
    fn test_decode_with_empty_registry() {
        let registry = EventRegistry::empty();
        let event = CloudWatchEvent::decode_with(&registry, &spot_body()).unwrap();
        assert!(matches!(event.detail, Detail::Generic(_)));
    }
}
