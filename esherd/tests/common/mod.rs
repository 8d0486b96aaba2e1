//! In-memory fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use esherd::cloud::{
    EcsServiceState, InstanceDescriber, InstanceInfo, LifecycleHooks, LifecycleResult,
    MessageQueue, QueueMessage, ScalingGroups, ServiceDeployments,
};
use esherd::cluster::{Method, SnapshotInfo, SnapshotRepository, Transport, EXCLUDE_NAME};
use esherd::{Cluster, Error, LifecycleAction, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// A recorded request
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
struct ClusterModel {
    nodes: Vec<String>,
    shards: BTreeMap<String, usize>,
    exclude_name: Option<String>,
    exclude_ip: Option<String>,
    health: Value,
    recovery: Value,
    node_stats: Value,
    failing: HashSet<String>,
    calls: Vec<Call>,
}

/// Elasticsearch stand-in answering the paths the facade uses
#[derive(Default)]
pub struct MockCluster {
    model: Mutex<ClusterModel>,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        let mock = Self::default();
        {
            let mut model = mock.model.lock();
            model.health = json!({"status": "green", "relocating_shards": 0});
            model.recovery = json!([]);
            model.node_stats = json!({"nodes": {}});
        }
        Arc::new(mock)
    }

    /// Facade over this mock
    pub fn cluster(self: &Arc<Self>) -> Arc<Cluster> {
        Arc::new(Cluster::new(Arc::clone(self) as Arc<dyn Transport>))
    }

    pub fn set_nodes(&self, nodes: &[&str]) {
        self.model.lock().nodes = nodes.iter().map(|n| n.to_string()).collect();
    }

    pub fn set_shards(&self, node: &str, count: usize) {
        self.model.lock().shards.insert(node.to_string(), count);
    }

    pub fn set_excluded(&self, value: Option<&str>) {
        self.model.lock().exclude_name = value.map(String::from);
    }

    pub fn set_excluded_ip(&self, value: Option<&str>) {
        self.model.lock().exclude_ip = value.map(String::from);
    }

    pub fn excluded(&self) -> Option<String> {
        self.model.lock().exclude_name.clone()
    }

    pub fn set_health(&self, status: &str, relocating: u64) {
        self.model.lock().health = json!({"status": status, "relocating_shards": relocating});
    }

    pub fn set_recovery(&self, rows: Value) {
        self.model.lock().recovery = rows;
    }

    pub fn set_node_stats(&self, value: Value) {
        self.model.lock().node_stats = value;
    }

    /// Requests whose path starts with `prefix` fail with a 500
    pub fn fail(&self, prefix: &str) {
        self.model.lock().failing.insert(prefix.to_string());
    }

    pub fn heal(&self, prefix: &str) {
        self.model.lock().failing.remove(prefix);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.model.lock().calls.clone()
    }

    /// Bodies of every settings write, in order
    pub fn settings_writes(&self) -> Vec<Value> {
        self.model
            .lock()
            .calls
            .iter()
            .filter(|c| c.method == Method::Put && c.path.starts_with("_cluster/settings"))
            .filter_map(|c| c.body.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockCluster {
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut model = self.model.lock();
        model.calls.push(Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        if model.failing.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return Err(Error::Remote {
                status: 500,
                body: "injected failure".into(),
            });
        }

        let response = match (method, path) {
            (Method::Get, p) if p.starts_with("_cat/nodes") => Value::Array(
                model.nodes.iter().map(|n| json!({"name": n})).collect(),
            ),
            (Method::Get, p) if p.starts_with("_cat/shards") => {
                let mut rows = Vec::new();
                for (node, count) in &model.shards {
                    for shard in 0..*count {
                        rows.push(json!({
                            "index": "logs",
                            "shard": shard.to_string(),
                            "prirep": "p",
                            "state": "STARTED",
                            "node": node,
                        }));
                    }
                }
                Value::Array(rows)
            }
            (Method::Get, p) if p.starts_with("_cluster/settings") => {
                let mut transient = serde_json::Map::new();
                if let Some(names) = &model.exclude_name {
                    transient.insert(EXCLUDE_NAME.to_string(), json!(names));
                }
                if let Some(ips) = &model.exclude_ip {
                    transient.insert(
                        "cluster.routing.allocation.exclude._ip".to_string(),
                        json!(ips),
                    );
                }
                json!({"persistent": {}, "transient": transient})
            }
            (Method::Put, p) if p.starts_with("_cluster/settings") => {
                let value = body
                    .and_then(|b| b.get("transient"))
                    .and_then(|t| t.get(EXCLUDE_NAME))
                    .cloned()
                    .unwrap_or(Value::Null);
                model.exclude_name = value.as_str().map(String::from);
                json!({"acknowledged": true})
            }
            (Method::Get, p) if p.starts_with("_cluster/health") => model.health.clone(),
            (Method::Get, p) if p.starts_with("_cat/recovery") => model.recovery.clone(),
            (Method::Get, p) if p.starts_with("_nodes/stats") => model.node_stats.clone(),
            (method, path) => {
                return Err(Error::Remote {
                    status: 404,
                    body: format!("no route for {} {}", method.as_str(), path),
                })
            }
        };
        Ok(response)
    }
}

/// Queue fed by the test; records acks and visibility extensions
#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<QueueMessage>>,
    acked: Mutex<Vec<String>>,
    extended: Mutex<Vec<String>>,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, id: &str, body: impl Into<String>) -> QueueMessage {
        let message = QueueMessage {
            id: id.to_string(),
            receipt: format!("receipt-{}", id),
            body: body.into(),
        };
        self.pending.lock().push_back(message.clone());
        message
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().clone()
    }

    pub fn extended(&self) -> Vec<String> {
        self.extended.lock().clone()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let batch: Vec<QueueMessage> = self.pending.lock().drain(..).collect();
        if batch.is_empty() {
            // long poll
            tokio::time::sleep(Duration::from_secs(20)).await;
        }
        Ok(batch)
    }

    async fn extend_visibility(&self, message: &QueueMessage, _timeout: Duration) -> Result<()> {
        self.extended.lock().push(message.id.clone());
        Ok(())
    }

    async fn ack(&self, message: &QueueMessage) -> Result<()> {
        self.acked.lock().push(message.id.clone());
        Ok(())
    }
}

/// Lifecycle hook API; optionally reports the action as expired
#[derive(Default)]
pub struct MemoryHooks {
    expired: Mutex<bool>,
    heartbeats: Mutex<Vec<String>>,
    completed: Mutex<Vec<(String, LifecycleResult)>>,
}

impl MemoryHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn expire(&self) {
        *self.expired.lock() = true;
    }

    pub fn heartbeats(&self) -> Vec<String> {
        self.heartbeats.lock().clone()
    }

    pub fn completed(&self) -> Vec<(String, LifecycleResult)> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl LifecycleHooks for MemoryHooks {
    async fn record_heartbeat(&self, action: &LifecycleAction) -> Result<()> {
        if *self.expired.lock() {
            return Err(Error::StateConflict(format!(
                "no active lifecycle action for {}",
                action.instance_id
            )));
        }
        self.heartbeats.lock().push(action.instance_id.clone());
        Ok(())
    }

    async fn complete(&self, action: &LifecycleAction, result: LifecycleResult) -> Result<()> {
        self.completed
            .lock()
            .push((action.instance_id.clone(), result));
        Ok(())
    }
}

/// Scaling groups tracking suspended processes per group
#[derive(Default)]
pub struct MemoryGroups {
    suspended: Mutex<BTreeMap<String, Vec<String>>>,
    calls: Mutex<Vec<(String, String, Vec<String>)>>,
    failing: Mutex<bool>,
    failing_groups: Mutex<BTreeSet<String>>,
}

impl MemoryGroups {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(action, group, processes)` for every write
    pub fn calls(&self) -> Vec<(String, String, Vec<String>)> {
        self.calls.lock().clone()
    }

    pub fn suspended(&self, group: &str) -> Vec<String> {
        self.suspended.lock().get(group).cloned().unwrap_or_default()
    }

    pub fn fail_reads(&self) {
        *self.failing.lock() = true;
    }

    /// Fail reads of `group` only
    pub fn fail_group(&self, group: &str) {
        self.failing_groups.lock().insert(group.to_string());
    }
}

#[async_trait]
impl ScalingGroups for MemoryGroups {
    async fn suspended_processes(&self, group: &str) -> Result<Vec<String>> {
        if *self.failing.lock() || self.failing_groups.lock().contains(group) {
            return Err(Error::Cloud("throttled".into()));
        }
        Ok(self.suspended(group))
    }

    async fn suspend_processes(&self, group: &str, processes: &[String]) -> Result<()> {
        self.calls
            .lock()
            .push(("suspend".into(), group.into(), processes.to_vec()));
        let mut suspended = self.suspended.lock();
        let entry = suspended.entry(group.to_string()).or_default();
        for p in processes {
            if !entry.contains(p) {
                entry.push(p.clone());
            }
        }
        Ok(())
    }

    async fn resume_processes(&self, group: &str, processes: &[String]) -> Result<()> {
        self.calls
            .lock()
            .push(("resume".into(), group.into(), processes.to_vec()));
        if let Some(entry) = self.suspended.lock().get_mut(group) {
            entry.retain(|p| !processes.contains(p));
        }
        Ok(())
    }
}

/// Fixed vCPU counts per instance
pub struct StaticInstances {
    pub vcpus: BTreeMap<String, u32>,
}

impl StaticInstances {
    pub fn new(entries: &[(&str, u32)]) -> Arc<Self> {
        Arc::new(Self {
            vcpus: entries.iter().map(|(id, n)| (id.to_string(), *n)).collect(),
        })
    }
}

#[async_trait]
impl InstanceDescriber for StaticInstances {
    async fn describe(&self, ids: &[String]) -> Result<Vec<InstanceInfo>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.vcpus.get(id).map(|vcpus| InstanceInfo {
                    id: id.clone(),
                    vcpus: *vcpus,
                })
            })
            .collect())
    }
}

pub struct FixedDeployments(pub usize);

#[async_trait]
impl ServiceDeployments for FixedDeployments {
    async fn service_state(&self, _cluster: &str, _service: &str) -> Result<EcsServiceState> {
        Ok(EcsServiceState {
            num_deployments: self.0,
        })
    }
}

/// Snapshot repository held in memory
#[derive(Default)]
pub struct MemoryRepository {
    snapshots: Mutex<Vec<SnapshotInfo>>,
    deleted: Mutex<Vec<String>>,
}

impl MemoryRepository {
    pub fn new(names: &[&str]) -> Arc<Self> {
        let repo = Self::default();
        *repo.snapshots.lock() = names
            .iter()
            .map(|n| SnapshotInfo {
                name: n.to_string(),
                state: Some("SUCCESS".into()),
            })
            .collect();
        Arc::new(repo)
    }

    pub fn insert(&self, name: &str, state: &str) {
        self.snapshots.lock().push(SnapshotInfo {
            name: name.to_string(),
            state: Some(state.to_string()),
        });
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshots.lock().iter().map(|s| s.name.clone()).collect();
        names.sort();
        names
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl SnapshotRepository for MemoryRepository {
    async fn list_snapshots(&self, _repository: &str) -> Result<Vec<SnapshotInfo>> {
        Ok(self.snapshots.lock().clone())
    }

    async fn create_snapshot(&self, _repository: &str, name: &str) -> Result<()> {
        self.snapshots.lock().push(SnapshotInfo {
            name: name.to_string(),
            state: Some("SUCCESS".into()),
        });
        Ok(())
    }

    async fn delete_snapshot(&self, _repository: &str, name: &str) -> Result<()> {
        self.snapshots.lock().retain(|s| s.name != name);
        self.deleted.lock().push(name.to_string());
        Ok(())
    }
}

pub fn spot_event(instance_id: &str) -> String {
    json!({
        "version": "0",
        "id": "spot-1",
        "detail-type": "EC2 Spot Instance Interruption Warning",
        "source": "aws.ec2",
        "account": "123456789012",
        "time": "2024-02-01T12:00:00Z",
        "region": "eu-west-1",
        "resources": [],
        "detail": {"instance-id": instance_id, "instance-action": "terminate"}
    })
    .to_string()
}

pub fn terminate_event(instance_id: &str) -> String {
    json!({
        "version": "0",
        "id": "hook-1",
        "detail-type": "EC2 Instance-terminate Lifecycle Action",
        "source": "aws.autoscaling",
        "account": "123456789012",
        "time": "2024-02-01T12:00:00Z",
        "region": "eu-west-1",
        "resources": [],
        "detail": {
            "LifecycleActionToken": "token-1",
            "AutoScalingGroupName": "es-data",
            "LifecycleHookName": "drain",
            "EC2InstanceId": instance_id,
            "LifecycleTransition": "autoscaling:EC2_INSTANCE_TERMINATING"
        }
    })
    .to_string()
}
