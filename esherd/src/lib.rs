//! esherd - control loops that keep an Elasticsearch cluster healthy on
//! AWS auto-scaling groups
//!
//! # Agents
//!
//! - **Drainer**: excludes a node from shard allocation before its instance
//!   terminates, holding the lifecycle hook until the node is empty
//! - **Throttler**: suspends scaling while the cluster is red, relocating or
//!   recovering, and resumes it afterwards
//! - **Stats collector**: joins node statistics with instance descriptions
//!   and publishes a cluster-wide metric panel
//! - **Snapshooter**: takes periodic snapshots and prunes them on a
//!   bucketed retention schedule
//!
//! Cloud services are reached through the traits in [`cloud`]; the
//! `esherd-aws` crate implements them on the AWS SDK.

pub mod cloud;
pub mod cluster;
pub mod config;
pub mod drain;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod nodestats;
pub mod retention;
pub mod telemetry;
pub mod throttle;
pub mod ticker;

pub use cloud::{
    EcsServiceState, InstanceDescriber, InstanceInfo, LifecycleHooks, LifecycleResult,
    MessageQueue, QueueMessage, ScalingGroups, ServiceDeployments,
};
pub use cluster::{AllocationExclusion, Cluster, ClusterState, ElasticsearchState, HealthStatus};
pub use config::{Agent, Config};
pub use drain::{DrainRequest, DrainState, Drainer};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use events::{CloudWatchEvent, Detail, EventRegistry};
pub use lifecycle::LifecycleAction;
pub use nodestats::{NodeStats, StatsCollector};
pub use retention::{RetentionConfig, Snapshooter};
pub use throttle::{ThrottleDecision, Throttler};
pub use ticker::Ticker;
