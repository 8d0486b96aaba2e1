//! Agent observability metrics
//!
//! Recorded through the `metrics` facade; the binary installs a Prometheus
//! recorder and serves the rendered registry.

use crate::nodestats::{MetricDatum, MetricValue};
use metrics::Label;
use std::time::Duration;

/// Record an Elasticsearch request
pub fn record_es_request(method: &str, status: &str, duration: Duration) {
    metrics::counter!(
        "esherd_es_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    metrics::histogram!(
        "esherd_es_request_duration_seconds",
        "method" => method.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a cloud API call
pub fn record_cloud_call(operation: &str, success: bool) {
    let status = if success { "ok" } else { "error" };
    metrics::counter!(
        "esherd_cloud_calls_total",
        "operation" => operation.to_string(),
        "status" => status,
    )
    .increment(1);
}

/// Record a drain state machine reaching a terminal state
pub fn record_drain_outcome(kind: &str, outcome: &str, duration: Duration) {
    metrics::counter!(
        "esherd_drain_messages_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);

    metrics::histogram!(
        "esherd_drain_duration_seconds",
        "kind" => kind.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Update the number of messages being processed
pub fn record_drains_in_flight(count: usize) {
    metrics::gauge!("esherd_drain_in_flight").set(count as f64);
}

/// Record a lifecycle heartbeat
pub fn record_heartbeat(success: bool) {
    let status = if success { "ok" } else { "error" };
    metrics::counter!("esherd_lifecycle_heartbeats_total", "status" => status).increment(1);
}

/// Record a throttler decision
pub fn record_throttle_decision(good: bool) {
    metrics::gauge!("esherd_scaling_permitted").set(if good { 1.0 } else { 0.0 });
    metrics::counter!(
        "esherd_throttle_ticks_total",
        "decision" => if good { "resume" } else { "suspend" },
    )
    .increment(1);
}

/// Record a suspend/resume call against a scaling group
pub fn record_scaling_toggle(group: &str, action: &str) {
    metrics::counter!(
        "esherd_scaling_toggles_total",
        "group" => group.to_string(),
        "action" => action.to_string(),
    )
    .increment(1);
}

/// Record a tick dropped because the consumer was still busy
pub fn record_tick_skipped(ticker: &str) {
    metrics::counter!("esherd_ticks_skipped_total", "ticker" => ticker.to_string()).increment(1);
}

/// Record a failed loop iteration
pub fn record_loop_error(agent: &str, error_type: &str) {
    metrics::counter!(
        "esherd_loop_errors_total",
        "agent" => agent.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record snapshot creation and retention results
pub fn record_snapshots(created: bool, kept: usize, deleted: usize) {
    if created {
        metrics::counter!("esherd_snapshots_created_total").increment(1);
    }
    metrics::gauge!("esherd_snapshots_kept").set(kept as f64);
    metrics::counter!("esherd_snapshots_deleted_total").increment(deleted as u64);
}

/// Publish an aggregated node panel as gauges.
///
/// `FSUtilization` becomes `esherd_cluster_fs_utilization`; statistic sets
/// are split over a `statistic` label.
pub fn publish_panel(points: &[MetricDatum]) {
    for point in points {
        let name = format!("esherd_cluster_{}", snake_case(&point.name));
        let labels: Vec<Label> = point
            .dimensions
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect();

        match &point.value {
            MetricValue::Value(value) => {
                metrics::gauge!(name, labels).set(*value);
            }
            MetricValue::Statistics(stats) => {
                for (statistic, value) in [
                    ("min", stats.min),
                    ("max", stats.max),
                    ("sum", stats.sum),
                    ("sample_count", stats.sample_count),
                ] {
                    let mut labels = labels.clone();
                    labels.push(Label::new("statistic", statistic));
                    metrics::gauge!(name.clone(), labels).set(value);
                }
            }
        }
    }
}

/// `JVMHeapPoolOldMaxBytes` → `jvm_heap_pool_old_max_bytes`
pub(crate) fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map_or(false, |n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
