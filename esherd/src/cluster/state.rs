//! Cluster membership and shard placement snapshot

use super::exclusion::AllocationExclusion;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Point-in-time view assembled from the nodes, shards and settings reads.
///
/// `nodes` is sorted and every key of `shards` is one of `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterState {
    pub nodes: Vec<String>,
    pub shards: BTreeMap<String, usize>,
    pub exclusions: AllocationExclusion,
}

impl ClusterState {
    pub fn assemble(
        mut nodes: Vec<String>,
        shards: BTreeMap<String, usize>,
        exclusions: AllocationExclusion,
    ) -> Self {
        nodes.sort();
        nodes.dedup();
        let shards = shards
            .into_iter()
            .filter(|(node, _)| nodes.binary_search(node).is_ok())
            .collect();
        Self {
            nodes,
            shards,
            exclusions,
        }
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    /// Shards currently placed on `name`; zero when the node is unknown
    pub fn shards_on(&self, name: &str) -> usize {
        self.shards.get(name).copied().unwrap_or(0)
    }

    /// Excluded node names that are no longer members of the cluster
    pub fn departed_exclusions(&self) -> Vec<String> {
        self.exclusions
            .name
            .iter()
            .filter(|name| !self.has_node(name))
            .cloned()
            .collect()
    }
}

/// Parse `GET _cat/nodes?format=json&h=name`
pub(crate) fn parse_nodes(value: &Value) -> Result<Vec<String>> {
    let rows = value
        .as_array()
        .ok_or_else(|| Error::Validation("_cat/nodes response is not an array".into()))?;
    let mut nodes: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("name").and_then(Value::as_str))
        .map(String::from)
        .collect();
    nodes.sort();
    nodes.dedup();
    Ok(nodes)
}

/// Parse `GET _cat/shards?format=json&h=index,shard,prirep,state,node`.
///
/// A relocating row reads `"src -> 10.0.0.2 id dst"`; it counts for the
/// source node. Unassigned rows have no node and are skipped.
pub(crate) fn parse_shards(value: &Value) -> Result<BTreeMap<String, usize>> {
    let rows = value
        .as_array()
        .ok_or_else(|| Error::Validation("_cat/shards response is not an array".into()))?;
    let mut shards = BTreeMap::new();
    for row in rows {
        let node = row
            .get("node")
            .and_then(Value::as_str)
            .and_then(|n| n.split_whitespace().next());
        if let Some(node) = node {
            *shards.entry(node.to_string()).or_insert(0) += 1;
        }
    }
    Ok(shards)
}
