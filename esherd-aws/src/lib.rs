//! AWS implementations of the esherd cloud traits
//!
//! - [`AutoScalingClient`]: scaling process suspension and lifecycle hooks
//! - [`SqsQueue`]: the event queue the drainer consumes
//! - [`Ec2Instances`]: vCPU counts for the node statistics panel
//! - [`EcsServices`]: deployment counts for the throttler's rollout check
//!
//! SDK failures become [`esherd::Error::Cloud`], except an expired lifecycle
//! action, which is an [`esherd::Error::StateConflict`].

pub mod autoscaling;
pub mod ec2;
pub mod ecs;
pub mod sqs;

pub use autoscaling::AutoScalingClient;
pub use ec2::Ec2Instances;
pub use ecs::EcsServices;
pub use sqs::SqsQueue;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_autoscaling::error::DisplayErrorContext;
use esherd::telemetry;
use esherd::Error;

/// Returned by Auto Scaling when the hook has timed out or was completed
const EXPIRED_ACTION: &str = "No active Lifecycle Action found";

/// Shared SDK configuration; `region` overrides the default provider chain
pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
    let loader = aws_config::defaults(BehaviorVersion::latest());
    let loader = match region {
        Some(region) => loader.region(Region::new(region.to_string())),
        None => loader,
    };
    loader.load().await
}

pub(crate) fn cloud_error<E>(operation: &str, err: E) -> Error
where
    E: std::error::Error,
{
    telemetry::record_cloud_call(operation, false);
    classify(operation, &DisplayErrorContext(&err).to_string())
}

fn classify(operation: &str, message: &str) -> Error {
    let message = format!("{}: {}", operation, message);
    if message.contains(EXPIRED_ACTION) {
        Error::StateConflict(message)
    } else {
        Error::Cloud(message)
    }
}

pub(crate) fn cloud_ok(operation: &str) {
    telemetry::record_cloud_call(operation, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use esherd::ErrorKind;

    #[test]
    fn test_expired_action_is_state_conflict() {
        let err = classify(
            "RecordLifecycleActionHeartbeat",
            "ValidationError: No active Lifecycle Action found with instance ID i-0abc",
        );
        assert!(matches!(err, Error::StateConflict(_)));
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn test_other_failures_are_transient() {
        let err = classify("SuspendProcesses", "Throttling: Rate exceeded");
        assert!(matches!(err, Error::Cloud(_)));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("SuspendProcesses"));
    }
}
