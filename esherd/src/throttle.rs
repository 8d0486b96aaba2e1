//! Scaling throttler
//!
//! Suspends Auto Scaling processes while the cluster is unstable and
//! resumes them once it settles. The decision is recomputed from
//! observation on every tick:
//!
//! ```text
//! good = status != red && !relocating && !recovering_from_store
//!        && (no ECS service configured || deployments <= 1)
//! ```

use crate::cloud::{ScalingGroups, ServiceDeployments};
use crate::cluster::{Cluster, HealthStatus};
use crate::error::{Error, Result, ResultExt};
use crate::telemetry;
use crate::ticker::Ticker;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleDecision {
    /// Scaling may proceed
    pub good: bool,
    /// Why scaling is held back; empty when `good`
    pub reasons: Vec<String>,
}

/// What a tick did to one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    Suspended,
    Resumed,
    Unchanged,
}

pub struct Throttler {
    cluster: Arc<Cluster>,
    groups: Arc<dyn ScalingGroups>,
    managed: Vec<String>,
    processes: Vec<String>,
    ecs: Option<(Arc<dyn ServiceDeployments>, String, String)>,
    dry_run: bool,
}

impl Throttler {
    pub fn new(
        cluster: Arc<Cluster>,
        groups: Arc<dyn ScalingGroups>,
        managed: Vec<String>,
        processes: Vec<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            cluster,
            groups,
            managed,
            processes,
            ecs: None,
            dry_run,
        }
    }

    /// Also hold scaling while `service` on `cluster` is rolling out
    pub fn with_ecs_service(
        mut self,
        deployments: Arc<dyn ServiceDeployments>,
        cluster: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        self.ecs = Some((deployments, cluster.into(), service.into()));
        self
    }

    pub async fn evaluate(&self) -> Result<ThrottleDecision> {
        let health = async { self.cluster.health().await };
        let ecs = async {
            match &self.ecs {
                Some((deployments, cluster, service)) => deployments
                    .service_state(cluster, service)
                    .await
                    .context("describe ECS service")
                    .map(Some),
                None => Ok(None),
            }
        };
        let (health, service) = tokio::try_join!(health, ecs)?;

        let mut reasons = Vec::new();
        if health.status == HealthStatus::Red {
            reasons.push("cluster status is red".to_string());
        }
        if health.relocating_shards {
            reasons.push("shards are relocating".to_string());
        }
        if health.recovering_from_store {
            reasons.push("shards are recovering from store".to_string());
        }
        if let Some(state) = service {
            if state.num_deployments > 1 {
                reasons.push(format!("{} ECS deployments active", state.num_deployments));
            }
        }

        Ok(ThrottleDecision {
            good: reasons.is_empty(),
            reasons,
        })
    }

    /// Evaluate once and bring every managed group in line.
    ///
    /// Only processes whose state differs are toggled, so an unchanged
    /// decision makes no cloud writes. A group that fails does not stop the
    /// others; the first failure is returned once every group was tried.
    pub async fn tick(&self) -> Result<Vec<(String, GroupAction)>> {
        let decision = self.evaluate().await?;
        telemetry::record_throttle_decision(decision.good);
        if decision.good {
            debug!("cluster stable, scaling permitted");
        } else {
            info!(reasons = %decision.reasons.join("; "), "cluster unstable, scaling held");
        }

        let mut actions = Vec::with_capacity(self.managed.len());
        let mut failures: Vec<Error> = Vec::new();
        for group in &self.managed {
            match self.apply(group, decision.good).await {
                Ok(action) => actions.push((group.clone(), action)),
                Err(e) => {
                    error!(group = %group, error = %e, "failed to apply throttle decision");
                    failures.push(e.context(group));
                }
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            Some(first) => Err(first.context(format!(
                "{} of {} groups failed",
                failed,
                self.managed.len()
            ))),
            None => Ok(actions),
        }
    }

    async fn apply(&self, group: &str, good: bool) -> Result<GroupAction> {
        let suspended = self
            .groups
            .suspended_processes(group)
            .await
            .context("describe scaling group")?;

        if good {
            let pending: Vec<String> = self
                .processes
                .iter()
                .filter(|p| suspended.contains(p))
                .cloned()
                .collect();
            if pending.is_empty() {
                return Ok(GroupAction::Unchanged);
            }
            if self.dry_run {
                info!(group = %group, processes = ?pending, "dry run: would resume processes");
            } else {
                self.groups
                    .resume_processes(group, &pending)
                    .await
                    .context("resume processes")?;
                info!(group = %group, processes = ?pending, "resumed scaling processes");
            }
            telemetry::record_scaling_toggle(group, "resume");
            Ok(GroupAction::Resumed)
        } else {
            let pending: Vec<String> = self
                .processes
                .iter()
                .filter(|p| !suspended.contains(p))
                .cloned()
                .collect();
            if pending.is_empty() {
                return Ok(GroupAction::Unchanged);
            }
            if self.dry_run {
                warn!(group = %group, processes = ?pending, "dry run: would suspend processes");
            } else {
                self.groups
                    .suspend_processes(group, &pending)
                    .await
                    .context("suspend processes")?;
                warn!(group = %group, processes = ?pending, "suspended scaling processes");
            }
            telemetry::record_scaling_toggle(group, "suspend");
            Ok(GroupAction::Suspended)
        }
    }

    pub async fn run(&self, mut ticker: Ticker, mut shutdown: watch::Receiver<bool>) {
        info!(groups = ?self.managed, dry_run = self.dry_run, "throttler started");
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        break;
                    }
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "throttle tick failed");
                        telemetry::record_loop_error("throttle", e.error_type());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("throttler stopped");
    }
}
