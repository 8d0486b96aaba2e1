//! Cluster health and recovery readings used by the throttler

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Red,
    Yellow,
    Green,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Red => "red",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Green => "green",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(HealthStatus::Red),
            "yellow" => Ok(HealthStatus::Yellow),
            "green" => Ok(HealthStatus::Green),
            other => Err(Error::Validation(format!("unknown health status '{}'", other))),
        }
    }
}

/// Health snapshot consumed by the throttler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElasticsearchState {
    pub status: HealthStatus,
    pub relocating_shards: bool,
    pub recovering_from_store: bool,
}

/// Parse `GET _cluster/health` into `(status, relocating)`
pub(crate) fn parse_health(value: &Value) -> Result<(HealthStatus, bool)> {
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("cluster health has no status".into()))?
        .parse()?;
    let relocating = value
        .get("relocating_shards")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        > 0;
    Ok((status, relocating))
}

/// Parse `GET _cat/recovery?active_only=true&format=json`.
///
/// Newer clusters report local-store recoveries as `existing_store`.
pub(crate) fn parse_recovering_from_store(value: &Value) -> Result<bool> {
    let rows = value
        .as_array()
        .ok_or_else(|| Error::Validation("_cat/recovery response is not an array".into()))?;
    Ok(rows.iter().any(|row| {
        row.get("type")
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case("store") || t.eq_ignore_ascii_case("existing_store"))
            .unwrap_or(false)
    }))
}
