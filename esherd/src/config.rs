//! Agent configuration
//!
//! Loaded from a TOML file; every field has a default so an absent file or
//! section is valid. Command-line flags are applied on top by the binary.

use crate::cloud::DEFAULT_SCALING_PROCESSES;
use crate::error::{Error, Result};
use crate::retention::RetentionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// The agent a process runs; validation depends on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agent {
    Drain,
    Throttle,
    Stats,
    Snapshot,
}

impl Agent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Drain => "drain",
            Agent::Throttle => "throttle",
            Agent::Stats => "stats",
            Agent::Snapshot => "snapshot",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub drainer: DrainerConfig,
    #[serde(default)]
    pub throttler: ThrottlerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub snapshots: SnapshotsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Log cloud and cluster writes instead of performing them
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElasticsearchConfig {
    /// Tried in order until one answers
    #[serde(default = "default_es_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_es_urls() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_request_timeout() -> u64 {
    30000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            urls: default_es_urls(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ElasticsearchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AwsConfig {
    /// Falls back to the SDK's region resolution when unset
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DrainerConfig {
    #[serde(default)]
    pub queue_url: String,
    /// How often shard placement is re-read while waiting
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Must stay below the hook heartbeat timeout and the queue visibility
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Give up on a message after this long
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_poll_interval() -> u64 {
    10_000
}

fn default_heartbeat_interval() -> u64 {
    60_000
}

fn default_wait_timeout() -> u64 {
    6 * 60 * 60 * 1000
}

fn default_visibility_timeout() -> u64 {
    300
}

fn default_max_in_flight() -> usize {
    16
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            poll_interval_ms: default_poll_interval(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            wait_timeout_ms: default_wait_timeout(),
            visibility_timeout_secs: default_visibility_timeout(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl DrainerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThrottlerConfig {
    /// Auto Scaling groups to suspend and resume
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default = "default_throttle_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_processes")]
    pub processes: Vec<String>,
    /// Treat an ongoing rollout of this ECS service as unstable
    #[serde(default)]
    pub ecs_cluster: Option<String>,
    #[serde(default)]
    pub ecs_service: Option<String>,
}

fn default_throttle_interval() -> u64 {
    30_000
}

fn default_processes() -> Vec<String> {
    DEFAULT_SCALING_PROCESSES.iter().map(|p| p.to_string()).collect()
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            interval_ms: default_throttle_interval(),
            processes: default_processes(),
            ecs_cluster: None,
            ecs_service: None,
        }
    }
}

impl ThrottlerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// `(cluster, service)` when both are configured
    pub fn ecs_service(&self) -> Option<(&str, &str)> {
        match (&self.ecs_cluster, &self.ecs_service) {
            (Some(cluster), Some(service)) => Some((cluster.as_str(), service.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_interval")]
    pub interval_ms: u64,
    /// Labels attached to every published point
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

fn default_stats_interval() -> u64 {
    60_000
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_stats_interval(),
            dimensions: Vec::new(),
        }
    }
}

impl StatsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn dimension_pairs(&self) -> Vec<(String, String)> {
        self.dimensions
            .iter()
            .map(|d| (d.name.clone(), d.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotsConfig {
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_snapshot_interval")]
    pub interval_ms: u64,
    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_repository() -> String {
    "backups".to_string()
}

fn default_snapshot_interval() -> u64 {
    60 * 60 * 1000
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            interval_ms: default_snapshot_interval(),
            retention: RetentionConfig::default(),
        }
    }
}

impl SnapshotsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:9464".to_string()
}

fn default_health_path() -> String {
    "/healthz".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            health_path: default_health_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl ServerConfig {
    pub fn parse_bind_addr(&self) -> Result<std::net::SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address {}: {}", self.bind_addr, e)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `plain` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "plain".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check the settings `agent` depends on
    pub fn validate(&self, agent: Agent) -> Result<()> {
        if self.elasticsearch.urls.iter().all(|u| u.trim().is_empty()) {
            return Err(Error::Config("elasticsearch.urls must not be empty".into()));
        }
        if self.elasticsearch.request_timeout_ms == 0 {
            return Err(Error::Config("elasticsearch.request_timeout_ms must be positive".into()));
        }
        self.server.parse_bind_addr()?;

        match agent {
            Agent::Drain => {
                let d = &self.drainer;
                if d.queue_url.is_empty() {
                    return Err(Error::Config("drainer.queue_url is required".into()));
                }
                if d.poll_interval_ms == 0 || d.heartbeat_interval_ms == 0 || d.wait_timeout_ms == 0 {
                    return Err(Error::Config("drainer intervals must be positive".into()));
                }
                if d.heartbeat_interval() >= d.visibility_timeout() {
                    return Err(Error::Config(format!(
                        "drainer.heartbeat_interval_ms ({}) must be below the visibility timeout ({}s)",
                        d.heartbeat_interval_ms, d.visibility_timeout_secs
                    )));
                }
                if d.max_in_flight == 0 {
                    return Err(Error::Config("drainer.max_in_flight must be positive".into()));
                }
            }
            Agent::Throttle => {
                let t = &self.throttler;
                if t.groups.is_empty() {
                    return Err(Error::Config("throttler.groups must not be empty".into()));
                }
                if t.interval_ms == 0 {
                    return Err(Error::Config("throttler.interval_ms must be positive".into()));
                }
                if t.processes.is_empty() {
                    return Err(Error::Config("throttler.processes must not be empty".into()));
                }
                if t.ecs_cluster.is_some() != t.ecs_service.is_some() {
                    return Err(Error::Config(
                        "throttler.ecs_cluster and throttler.ecs_service go together".into(),
                    ));
                }
            }
            Agent::Stats => {
                if self.stats.interval_ms == 0 {
                    return Err(Error::Config("stats.interval_ms must be positive".into()));
                }
            }
            Agent::Snapshot => {
                let s = &self.snapshots;
                if s.repository.is_empty() {
                    return Err(Error::Config("snapshots.repository must not be empty".into()));
                }
                if s.interval_ms == 0 {
                    return Err(Error::Config("snapshots.interval_ms must be positive".into()));
                }
                s.retention.validate()?;
            }
        }
        Ok(())
    }
}
