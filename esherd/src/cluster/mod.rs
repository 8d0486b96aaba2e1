//! Cluster facade
//!
//! Reads cluster membership, shard placement, health and node statistics,
//! and edits the allocation exclusion list. The exclusion list is the only
//! cluster resource written by the agents, so it is guarded by a
//! many-readers/one-writer lock:
//!
//! ```text
//! get_state / exclusions / health   → read slot  (concurrent)
//! drain_nodes / undrain_nodes       → write slot (read-modify-write)
//! ```
//!
//! Failed requests are returned wrapped with a short cause tag; retries are
//! left to the caller.

pub mod exclusion;
pub mod health;
pub mod snapshot;
pub mod state;
pub mod transport;

pub use exclusion::{AllocationExclusion, EXCLUDE_NAME};
pub use health::{ElasticsearchState, HealthStatus};
pub use snapshot::{SnapshotInfo, SnapshotRepository};
pub use state::ClusterState;
pub use transport::{HttpTransport, Method, Transport};

use crate::config::ElasticsearchConfig;
use crate::error::{Result, ResultExt};
use crate::nodestats::NodeStatsSample;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const NODES_PATH: &str = "_cat/nodes?format=json&h=name";
const SHARDS_PATH: &str = "_cat/shards?format=json&h=index,shard,prirep,state,node";
const SETTINGS_PATH: &str = "_cluster/settings?flat_settings=true";
const HEALTH_PATH: &str = "_cluster/health";
const RECOVERY_PATH: &str = "_cat/recovery?active_only=true&format=json&h=index,shard,type,stage";
const NODE_STATS_PATH: &str = "_nodes/stats/jvm,os,fs";

pub struct Cluster {
    transport: Arc<dyn Transport>,
    settings_lock: RwLock<()>,
}

impl Cluster {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            settings_lock: RwLock::new(()),
        }
    }

    /// Build an HTTP-backed facade from configuration
    pub fn from_config(config: &ElasticsearchConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.urls, config.request_timeout())?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Fetch nodes, shard placement and exclusions concurrently
    pub async fn get_state(&self) -> Result<ClusterState> {
        let _guard = self.settings_lock.read().await;
        let (nodes, shards, exclusions) = tokio::try_join!(
            self.fetch_nodes(),
            self.fetch_shards(),
            self.fetch_exclusions(),
        )?;
        Ok(ClusterState::assemble(nodes, shards, exclusions))
    }

    /// Current allocation exclusion setting
    pub async fn exclusions(&self) -> Result<AllocationExclusion> {
        let _guard = self.settings_lock.read().await;
        self.fetch_exclusions().await
    }

    /// Exclude `names` from shard allocation.
    ///
    /// Returns whether a settings write was issued; nothing is written when
    /// every name is already excluded. Only `exclude._name` is written, so
    /// `_ip`, `_host` and attribute exclusions on the cluster stay as they are.
    pub async fn drain_nodes<S>(&self, names: &[S]) -> Result<bool>
    where
        S: AsRef<str> + Sync,
    {
        let _guard = self.settings_lock.write().await;
        let mut exclusion = self.fetch_exclusions().await?;

        let mut changed = false;
        for name in names {
            changed |= exclusion.insert_name(name.as_ref());
        }
        if !changed {
            debug!("all requested nodes already drained");
            return Ok(false);
        }

        self.write_exclusions(&exclusion).await.context("drain nodes")?;
        info!(excluded = %exclusion.name.join(","), "updated allocation exclusions");
        Ok(true)
    }

    /// Remove `names` from the exclusion list; clears the setting when the
    /// list becomes empty. Returns whether a write was issued. Like
    /// [`Cluster::drain_nodes`], leaves the other exclusion criteria alone.
    pub async fn undrain_nodes<S>(&self, names: &[S]) -> Result<bool>
    where
        S: AsRef<str> + Sync,
    {
        let _guard = self.settings_lock.write().await;
        let mut exclusion = self.fetch_exclusions().await?;

        let mut changed = false;
        for name in names {
            changed |= exclusion.remove_name(name.as_ref());
        }
        if !changed {
            debug!("none of the requested nodes are drained");
            return Ok(false);
        }

        self.write_exclusions(&exclusion).await.context("undrain nodes")?;
        info!(excluded = %exclusion.name.join(","), "updated allocation exclusions");
        Ok(true)
    }

    /// Health status, relocation and store-recovery flags read concurrently
    pub async fn health(&self) -> Result<ElasticsearchState> {
        let (health, recovery) = tokio::try_join!(
            async {
                self.transport
                    .request(Method::Get, HEALTH_PATH, None)
                    .await
                    .context("get health")
            },
            async {
                self.transport
                    .request(Method::Get, RECOVERY_PATH, None)
                    .await
                    .context("get recovery")
            },
        )?;
        let (status, relocating_shards) = health::parse_health(&health)?;
        let recovering_from_store = health::parse_recovering_from_store(&recovery)?;
        Ok(ElasticsearchState {
            status,
            relocating_shards,
            recovering_from_store,
        })
    }

    /// Per-node JVM, OS and filesystem statistics
    pub async fn node_stats(&self) -> Result<Vec<NodeStatsSample>> {
        let value = self
            .transport
            .request(Method::Get, NODE_STATS_PATH, None)
            .await
            .context("get node stats")?;
        NodeStatsSample::from_nodes_stats(&value)
    }

    async fn fetch_nodes(&self) -> Result<Vec<String>> {
        let value = self
            .transport
            .request(Method::Get, NODES_PATH, None)
            .await
            .context("get nodes")?;
        state::parse_nodes(&value)
    }

    async fn fetch_shards(&self) -> Result<BTreeMap<String, usize>> {
        let value = self
            .transport
            .request(Method::Get, SHARDS_PATH, None)
            .await
            .context("get shards")?;
        state::parse_shards(&value)
    }

    async fn fetch_exclusions(&self) -> Result<AllocationExclusion> {
        let value = self
            .transport
            .request(Method::Get, SETTINGS_PATH, None)
            .await
            .context("get settings")?;
        AllocationExclusion::from_settings(&value)
    }

    async fn write_exclusions(&self, exclusion: &AllocationExclusion) -> Result<()> {
        let body = exclusion.update_body();
        self.transport
            .request(Method::Put, "_cluster/settings", Some(&body))
            .await
            .context("put settings")?;
        Ok(())
    }
}
