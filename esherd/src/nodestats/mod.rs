//! Per-node statistics and the cluster-wide metric panel built from them
//!
//! A [`NodeStats`] joins three observations of the same node:
//!
//! - the `_nodes/stats` sample reported by Elasticsearch,
//! - the compute instance description (for the vCPU count),
//! - the current allocation exclusion setting.
//!
//! Node names are the instance IDs, so the join key is the node name.

pub mod aggregate;
pub mod collector;

pub use aggregate::{
    aggregate, panel, Aggregation, MetricDatum, MetricSpec, MetricValue, Selector, StatisticSet,
    Unit,
};
pub use collector::StatsCollector;

use crate::cloud::InstanceInfo;
use crate::cluster::AllocationExclusion;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Used/max pair for the heap and heap pools
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryUsage {
    pub max: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FsUsage {
    pub total: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one: Option<f64>,
    pub five: Option<f64>,
    pub fifteen: Option<f64>,
}

/// One node's entry of `GET _nodes/stats/jvm,os,fs`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStatsSample {
    pub name: String,
    pub host: Option<String>,
    pub ip: Option<String>,
    pub roles: Vec<String>,
    pub load_average: LoadAverage,
    pub heap: MemoryUsage,
    pub heap_pools: BTreeMap<String, MemoryUsage>,
    pub fs: FsUsage,
}

impl NodeStatsSample {
    pub fn from_nodes_stats(value: &Value) -> Result<Vec<Self>> {
        let nodes = value
            .get("nodes")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Validation("node stats response has no nodes".into()))?;
        nodes.values().map(Self::from_node).collect()
    }

    fn from_node(node: &Value) -> Result<Self> {
        let name = node
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("node stats entry has no name".into()))?
            .to_string();

        let mut roles: Vec<String> = node
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        roles.sort();
        roles.dedup();

        let load = node.pointer("/os/cpu/load_average");
        let load_average = LoadAverage {
            one: load.and_then(|l| l.get("1m")).and_then(Value::as_f64),
            five: load.and_then(|l| l.get("5m")).and_then(Value::as_f64),
            fifteen: load.and_then(|l| l.get("15m")).and_then(Value::as_f64),
        };

        let mem = node.pointer("/jvm/mem");
        let heap = MemoryUsage {
            max: u64_at(mem, "heap_max_in_bytes"),
            used: u64_at(mem, "heap_used_in_bytes"),
        };
        let heap_pools = mem
            .and_then(|m| m.get("pools"))
            .and_then(Value::as_object)
            .map(|pools| {
                pools
                    .iter()
                    .map(|(pool, usage)| {
                        let usage = Some(usage);
                        (
                            pool.clone(),
                            MemoryUsage {
                                max: u64_at(usage, "max_in_bytes"),
                                used: u64_at(usage, "used_in_bytes"),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let fs_total = node.pointer("/fs/total");
        let fs = FsUsage {
            total: u64_at(fs_total, "total_in_bytes"),
            available: u64_at(fs_total, "available_in_bytes"),
        };

        Ok(Self {
            name,
            host: node.get("host").and_then(Value::as_str).map(String::from),
            ip: node.get("ip").and_then(Value::as_str).map(String::from),
            roles,
            load_average,
            heap,
            heap_pools,
            fs,
        })
    }
}

fn u64_at(value: Option<&Value>, key: &str) -> u64 {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Joined per-node observation fed to the aggregator
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStats {
    pub name: String,
    /// Sorted role names; empty means coordinating-only
    pub roles: Vec<String>,
    pub excluded: bool,
    pub vcpus: u32,
    pub load_average: LoadAverage,
    pub heap: MemoryUsage,
    pub heap_pools: BTreeMap<String, MemoryUsage>,
    pub fs: FsUsage,
}

impl NodeStats {
    /// Join a stats sample with its instance description.
    ///
    /// Fails with [`Error::InconsistentNodes`] if they describe different nodes.
    pub fn new(
        sample: NodeStatsSample,
        instance: &InstanceInfo,
        exclusions: &AllocationExclusion,
    ) -> Result<Self> {
        if sample.name != instance.id {
            return Err(Error::InconsistentNodes {
                sample: sample.name,
                instance: instance.id.clone(),
            });
        }

        let excluded = is_excluded(&sample, exclusions);
        Ok(Self {
            name: sample.name,
            roles: sample.roles,
            excluded,
            vcpus: instance.vcpus,
            load_average: sample.load_average,
            heap: sample.heap,
            heap_pools: sample.heap_pools,
            fs: sample.fs,
        })
    }

    /// Whether the node carries `role`.
    ///
    /// `"all"` matches every node; `"coordinate"` matches nodes without any
    /// role, which Elasticsearch treats as coordinating-only.
    pub fn has_role(&self, role: &str) -> bool {
        match role {
            "all" => true,
            "coordinate" => self.roles.is_empty(),
            role => self
                .roles
                .binary_search_by(|r| r.as_str().cmp(role))
                .is_ok(),
        }
    }
}

fn is_excluded(sample: &NodeStatsSample, exclusions: &AllocationExclusion) -> bool {
    if exclusions.contains_name(&sample.name) {
        return true;
    }
    if let Some(host) = &sample.host {
        if exclusions.host.iter().any(|h| h == host) {
            return true;
        }
    }
    if let Some(ip) = &sample.ip {
        // transport address is reported as "10.0.0.1:9300"
        let ip = ip.split(':').next().unwrap_or(ip);
        if exclusions.ip.iter().any(|i| i == ip) {
            return true;
        }
    }
    false
}
