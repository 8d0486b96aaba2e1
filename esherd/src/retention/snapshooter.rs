//! Periodic snapshot creation and pruning

use super::{parse_snapshot_name, plan, snapshot_name, RetentionConfig};
use crate::cluster::SnapshotRepository;
use crate::error::Result;
use crate::telemetry;
use crate::ticker::Ticker;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What one snapshooter tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Name of the snapshot started this tick
    pub created: Option<String>,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    /// Set when a snapshot was still running and the tick did nothing
    pub skipped: bool,
}

pub struct Snapshooter {
    repo: Arc<dyn SnapshotRepository>,
    repository: String,
    retention: RetentionConfig,
    dry_run: bool,
}

impl Snapshooter {
    pub fn new(
        repo: Arc<dyn SnapshotRepository>,
        repository: impl Into<String>,
        retention: RetentionConfig,
        dry_run: bool,
    ) -> Result<Self> {
        retention.validate()?;
        Ok(Self {
            repo,
            repository: repository.into(),
            retention,
            dry_run,
        })
    }

    /// Take a snapshot named for `now` and prune the repository.
    ///
    /// Snapshots whose names are not timestamps are left alone.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SnapshotReport> {
        let listed = self.repo.list_snapshots(&self.repository).await?;

        if let Some(running) = listed
            .iter()
            .find(|s| s.state.as_deref() == Some("IN_PROGRESS"))
        {
            warn!(
                repository = %self.repository,
                snapshot = %running.name,
                "snapshot still in progress, skipping tick"
            );
            return Ok(SnapshotReport {
                skipped: true,
                ..Default::default()
            });
        }

        let name = snapshot_name(now);
        // Names carry whole seconds only
        let now = parse_snapshot_name(&name).unwrap_or(now);
        let mut by_instant: HashMap<DateTime<Utc>, String> = HashMap::new();
        for snapshot in &listed {
            match parse_snapshot_name(&snapshot.name) {
                Some(t) => {
                    by_instant.insert(t, snapshot.name.clone());
                }
                None => debug!(snapshot = %snapshot.name, "ignoring foreign snapshot"),
            }
        }

        let created = if by_instant.contains_key(&now) {
            None
        } else if self.dry_run {
            info!(repository = %self.repository, snapshot = %name, "dry run: would create snapshot");
            Some(name.clone())
        } else {
            self.repo.create_snapshot(&self.repository, &name).await?;
            info!(repository = %self.repository, snapshot = %name, "snapshot started");
            Some(name.clone())
        };
        by_instant.insert(now, name);

        let instants: Vec<DateTime<Utc>> = by_instant.keys().copied().collect();
        let retention = plan(&self.retention, &instants);

        let mut deleted = Vec::with_capacity(retention.delete.len());
        for t in &retention.delete {
            let Some(victim) = by_instant.get(t) else {
                continue;
            };
            if self.dry_run {
                info!(repository = %self.repository, snapshot = %victim, "dry run: would delete snapshot");
            } else {
                self.repo.delete_snapshot(&self.repository, victim).await?;
                info!(repository = %self.repository, snapshot = %victim, "snapshot deleted");
            }
            deleted.push(victim.clone());
        }

        let kept: Vec<String> = retention
            .keep
            .iter()
            .filter_map(|t| by_instant.get(t).cloned())
            .collect();

        telemetry::record_snapshots(created.is_some(), kept.len(), deleted.len());
        debug!(
            kept = kept.len(),
            deleted = deleted.len(),
            rescued = retention.rescued,
            "retention applied"
        );

        Ok(SnapshotReport {
            created,
            kept,
            deleted,
            skipped: false,
        })
    }

    pub async fn run(&self, mut ticker: Ticker, mut shutdown: watch::Receiver<bool>) {
        info!(repository = %self.repository, dry_run = self.dry_run, "snapshooter started");
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        break;
                    }
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!(error = %e, "snapshot tick failed");
                        telemetry::record_loop_error("snapshot", e.error_type());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("snapshooter stopped");
    }
}
