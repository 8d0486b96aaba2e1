//! Scaling throttler decisions and cloud calls

mod common;

use common::{FixedDeployments, MemoryGroups, MockCluster};
use esherd::cloud::DEFAULT_SCALING_PROCESSES;
use esherd::throttle::GroupAction;
use esherd::Throttler;
use serde_json::json;
use std::sync::Arc;

fn processes() -> Vec<String> {
    DEFAULT_SCALING_PROCESSES.iter().map(|p| p.to_string()).collect()
}

fn throttler(mock: &Arc<MockCluster>, groups: &Arc<MemoryGroups>, dry_run: bool) -> Throttler {
    Throttler::new(
        mock.cluster(),
        groups.clone(),
        vec!["es-data".into(), "es-master".into()],
        processes(),
        dry_run,
    )
}

#[tokio::test]
async fn test_red_cluster_suspends_every_group() {
    let mock = MockCluster::new();
    mock.set_health("red", 1);
    let groups = MemoryGroups::new();

    let actions = throttler(&mock, &groups, false).tick().await.unwrap();

    assert_eq!(
        actions,
        vec![
            ("es-data".to_string(), GroupAction::Suspended),
            ("es-master".to_string(), GroupAction::Suspended),
        ]
    );
    let calls = groups.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|(action, _, procs)| action == "suspend" && *procs == processes()));
}

#[tokio::test]
async fn test_constant_input_makes_no_further_calls() {
    let mock = MockCluster::new();
    mock.set_health("yellow", 3);
    let groups = MemoryGroups::new();
    let throttler = throttler(&mock, &groups, false);

    for _ in 0..5 {
        throttler.tick().await.unwrap();
    }
    assert_eq!(groups.calls().len(), 2);

    mock.set_health("green", 0);
    for _ in 0..5 {
        throttler.tick().await.unwrap();
    }
    let calls = groups.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[2..].iter().all(|(action, _, _)| action == "resume"));
    assert!(groups.suspended("es-data").is_empty());
}

#[tokio::test]
async fn test_healthy_cluster_with_nothing_suspended_is_quiet() {
    let mock = MockCluster::new();
    let groups = MemoryGroups::new();

    let actions = throttler(&mock, &groups, false).tick().await.unwrap();
    assert!(actions.iter().all(|(_, a)| *a == GroupAction::Unchanged));
    assert!(groups.calls().is_empty());
}

#[tokio::test]
async fn test_store_recovery_holds_scaling() {
    let mock = MockCluster::new();
    mock.set_recovery(json!([{"index": "logs", "shard": "0", "type": "existing_store", "stage": "index"}]));
    let groups = MemoryGroups::new();

    let decision = throttler(&mock, &groups, false).evaluate().await.unwrap();
    assert!(!decision.good);
    assert_eq!(decision.reasons.len(), 1);
}

#[tokio::test]
async fn test_ecs_rollout_holds_scaling() {
    let mock = MockCluster::new();
    let groups = MemoryGroups::new();

    let rolling = throttler(&mock, &groups, false)
        .with_ecs_service(Arc::new(FixedDeployments(2)), "prod", "search");
    assert!(!rolling.evaluate().await.unwrap().good);

    let steady = throttler(&mock, &groups, false)
        .with_ecs_service(Arc::new(FixedDeployments(1)), "prod", "search");
    assert!(steady.evaluate().await.unwrap().good);
}

#[tokio::test]
async fn test_dry_run_makes_no_calls() {
    let mock = MockCluster::new();
    mock.set_health("red", 0);
    let groups = MemoryGroups::new();

    let actions = throttler(&mock, &groups, true).tick().await.unwrap();
    assert!(actions.iter().all(|(_, a)| *a == GroupAction::Suspended));
    assert!(groups.calls().is_empty());
}

#[tokio::test]
async fn test_health_failure_fails_the_tick() {
    let mock = MockCluster::new();
    mock.fail("_cat/recovery");
    let groups = MemoryGroups::new();

    assert!(throttler(&mock, &groups, false).tick().await.is_err());
    assert!(groups.calls().is_empty());
}

#[tokio::test]
async fn test_group_read_failure_fails_the_tick() {
    let mock = MockCluster::new();
    mock.set_health("red", 0);
    let groups = MemoryGroups::new();
    groups.fail_reads();

    assert!(throttler(&mock, &groups, false).tick().await.is_err());
    assert!(groups.calls().is_empty());
}

#[tokio::test]
async fn test_failing_group_does_not_block_the_others() {
    let mock = MockCluster::new();
    mock.set_health("red", 0);
    let groups = MemoryGroups::new();
    groups.fail_group("es-data");

    let err = throttler(&mock, &groups, false).tick().await.unwrap_err();
    assert!(err.to_string().contains("1 of 2 groups failed"));
    assert_eq!(err.error_type(), "cloud");

    let calls = groups.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "suspend");
    assert_eq!(calls[0].1, "es-master");
    assert_eq!(groups.suspended("es-master"), processes());
}
