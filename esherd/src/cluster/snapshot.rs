//! Snapshot repository access

use super::transport::Method;
use super::Cluster;
use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use serde_json::{json, Value};

/// A snapshot as listed by the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub name: String,
    pub state: Option<String>,
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn list_snapshots(&self, repository: &str) -> Result<Vec<SnapshotInfo>>;

    async fn create_snapshot(&self, repository: &str, name: &str) -> Result<()>;

    async fn delete_snapshot(&self, repository: &str, name: &str) -> Result<()>;
}

#[async_trait]
impl SnapshotRepository for Cluster {
    async fn list_snapshots(&self, repository: &str) -> Result<Vec<SnapshotInfo>> {
        let path = format!("_snapshot/{}/_all", repository);
        let value = self
            .transport
            .request(Method::Get, &path, None)
            .await
            .context("list snapshots")?;
        parse_snapshots(&value)
    }

    async fn create_snapshot(&self, repository: &str, name: &str) -> Result<()> {
        let path = format!("_snapshot/{}/{}?wait_for_completion=false", repository, name);
        let body = json!({"include_global_state": true});
        self.transport
            .request(Method::Put, &path, Some(&body))
            .await
            .context("create snapshot")?;
        Ok(())
    }

    async fn delete_snapshot(&self, repository: &str, name: &str) -> Result<()> {
        let path = format!("_snapshot/{}/{}", repository, name);
        self.transport
            .request(Method::Delete, &path, None)
            .await
            .context("delete snapshot")?;
        Ok(())
    }
}

fn parse_snapshots(value: &Value) -> Result<Vec<SnapshotInfo>> {
    let snapshots = value
        .get("snapshots")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Validation("snapshot listing has no snapshots array".into()))?;
    Ok(snapshots
        .iter()
        .filter_map(|s| {
            let name = s.get("snapshot").and_then(Value::as_str)?;
            Some(SnapshotInfo {
                name: name.to_string(),
                state: s.get("state").and_then(Value::as_str).map(String::from),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshots() {
        let value = json!({"snapshots": [
            {"snapshot": "2024-01-01t00-00-00", "state": "SUCCESS"},
            {"snapshot": "manual", "state": "IN_PROGRESS"},
            {"state": "FAILED"}
        ]});
        let snapshots = parse_snapshots(&value).unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "2024-01-01t00-00-00");
        assert_eq!(snapshots[1].state.as_deref(), Some("IN_PROGRESS"));
    }

    #[test]
    fn test_parse_snapshots_requires_array() {
        assert!(parse_snapshots(&json!({})).is_err());
    }
}
