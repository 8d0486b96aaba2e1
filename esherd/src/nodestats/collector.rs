//! Periodic node statistics collection and publication

use super::{aggregate, MetricDatum, NodeStats};
use crate::cloud::InstanceDescriber;
use crate::cluster::Cluster;
use crate::error::Result;
use crate::telemetry;
use crate::ticker::Ticker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct StatsCollector {
    cluster: Arc<Cluster>,
    instances: Arc<dyn InstanceDescriber>,
    dimensions: Vec<(String, String)>,
}

impl StatsCollector {
    pub fn new(
        cluster: Arc<Cluster>,
        instances: Arc<dyn InstanceDescriber>,
        dimensions: Vec<(String, String)>,
    ) -> Self {
        Self {
            cluster,
            instances,
            dimensions,
        }
    }

    /// Join node samples with instance descriptions and exclusions.
    ///
    /// Nodes that cannot be joined are logged and left out.
    pub async fn collect(&self) -> Result<Vec<NodeStats>> {
        let (samples, exclusions) =
            tokio::try_join!(self.cluster.node_stats(), self.cluster.exclusions())?;

        let ids: Vec<String> = samples.iter().map(|s| s.name.clone()).collect();
        let instances: HashMap<String, _> = self
            .instances
            .describe(&ids)
            .await?
            .into_iter()
            .map(|i| (i.id.clone(), i))
            .collect();

        let mut stats = Vec::with_capacity(samples.len());
        for sample in samples {
            let Some(instance) = instances.get(&sample.name) else {
                warn!(node = %sample.name, "no instance description for node, skipping");
                continue;
            };
            match NodeStats::new(sample, instance, &exclusions) {
                Ok(node) => stats.push(node),
                Err(e) => warn!(error = %e, "skipping node"),
            }
        }
        Ok(stats)
    }

    /// Collect, aggregate and publish one panel
    pub async fn run_once(&self) -> Result<Vec<MetricDatum>> {
        let nodes = self.collect().await?;
        let points = aggregate(&nodes, &self.dimensions);
        telemetry::publish_panel(&points);
        debug!(nodes = nodes.len(), points = points.len(), "published node panel");
        Ok(points)
    }

    pub async fn run(&self, mut ticker: Ticker, mut shutdown: watch::Receiver<bool>) {
        info!("stats collector started");
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        break;
                    }
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "stats collection failed");
                        telemetry::record_loop_error("stats", e.error_type());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("stats collector stopped");
    }
}
