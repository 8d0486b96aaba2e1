//! Shard allocation exclusion setting
//!
//! Elasticsearch moves shards off every node matching
//! `cluster.routing.allocation.exclude.{_name,_ip,_host,<attr>}`. Only the
//! `_name` list is managed here; the other criteria are read so they can be
//! reported and are never written.

use crate::error::{Error, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const EXCLUDE_PREFIX: &str = "cluster.routing.allocation.exclude.";
pub const EXCLUDE_NAME: &str = "cluster.routing.allocation.exclude._name";

/// Current value of the transient allocation exclusion setting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationExclusion {
    /// Sorted, de-duplicated node names
    pub name: Vec<String>,
    pub ip: Vec<String>,
    pub host: Vec<String>,
    pub attr: BTreeMap<String, Vec<String>>,
}

impl AllocationExclusion {
    /// Parse from a `GET _cluster/settings` response.
    ///
    /// Accepts both the `flat_settings=true` shape and the nested one.
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let mut exclusion = Self::default();
        let Some(transient) = settings.get("transient") else {
            return Ok(exclusion);
        };
        let transient = transient
            .as_object()
            .ok_or_else(|| Error::Validation("transient settings is not an object".into()))?;

        for (key, value) in transient {
            if let Some(criterion) = key.strip_prefix(EXCLUDE_PREFIX) {
                exclusion.set_criterion(criterion, value);
            }
        }

        let nested = transient
            .get("cluster")
            .and_then(|v| v.get("routing"))
            .and_then(|v| v.get("allocation"))
            .and_then(|v| v.get("exclude"))
            .and_then(Value::as_object);
        if let Some(nested) = nested {
            for (criterion, value) in nested {
                exclusion.set_criterion(criterion, value);
            }
        }

        Ok(exclusion)
    }

    fn set_criterion(&mut self, criterion: &str, value: &Value) {
        let list = parse_list(value);
        match criterion {
            "_name" => self.name = list,
            "_ip" => self.ip = list,
            "_host" => self.host = list,
            attr => {
                self.attr.insert(attr.to_string(), list);
            }
        }
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    /// Insert keeping the list sorted; returns false if already present
    pub fn insert_name(&mut self, name: &str) -> bool {
        match self.name.binary_search_by(|n| n.as_str().cmp(name)) {
            Ok(_) => false,
            Err(pos) => {
                self.name.insert(pos, name.to_string());
                true
            }
        }
    }

    /// Remove a name; returns false if it was absent
    pub fn remove_name(&mut self, name: &str) -> bool {
        match self.name.binary_search_by(|n| n.as_str().cmp(name)) {
            Ok(pos) => {
                self.name.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Body of the `PUT _cluster/settings` request writing the name list.
    ///
    /// An empty list is written as `null`, which removes the setting.
    pub fn update_body(&self) -> Value {
        let value = if self.name.is_empty() {
            Value::Null
        } else {
            Value::String(self.name.join(","))
        };
        let mut transient = Map::new();
        transient.insert(EXCLUDE_NAME.to_string(), value);
        json!({ "transient": transient })
    }
}

/// Settings lists come back either as a comma separated string or an array
fn parse_list(value: &Value) -> Vec<String> {
    let mut items: Vec<String> = match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };
    items.sort();
    items.dedup();
    items
}
