//! Drain coordinator
//!
//! Every queue message runs through its own state machine:
//!
//! ```text
//!   Received ──decode error──► Dead (ack + drop)
//!      │
//!   Draining   exclude the node from allocation
//!      │
//!   Waiting    poll shard placement, heartbeat the hook
//!      │                 │
//!    Done           Abandoned (no ack, redelivered)
//! ```
//!
//! Spot interruptions skip `Waiting`: there is no hook to hold, so the
//! message is acknowledged once the drain is issued.
//!
//! Exclusions of nodes that have left the cluster are pruned after each
//! completed message and whenever a receive comes back empty.

use crate::cloud::{LifecycleHooks, LifecycleResult, MessageQueue, QueueMessage};
use crate::cluster::{Cluster, ClusterState};
use crate::config::DrainerConfig;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::events::{CloudWatchEvent, Detail};
use crate::lifecycle::LifecycleAction;
use crate::telemetry;
use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Received,
    Draining,
    Waiting,
    Done,
    Dead,
    Abandoned,
}

impl DrainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainState::Received => "received",
            DrainState::Draining => "draining",
            DrainState::Waiting => "waiting",
            DrainState::Done => "done",
            DrainState::Dead => "dead",
            DrainState::Abandoned => "abandoned",
        }
    }
}

/// A decoded message the drainer acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainRequest {
    Termination(LifecycleAction),
    SpotInterruption { instance_id: String },
}

impl DrainRequest {
    pub fn from_event(event: &CloudWatchEvent) -> Result<Self> {
        match &event.detail {
            Detail::LifecycleAction(detail) => {
                let start = event.time.unwrap_or_else(Utc::now);
                Ok(DrainRequest::Termination(LifecycleAction::from_detail(detail, start)?))
            }
            Detail::SpotInterruption(detail) => Ok(DrainRequest::SpotInterruption {
                instance_id: detail.instance_id.clone(),
            }),
            other => Err(Error::UnexpectedEvent(format!(
                "{} / {} ({})",
                event.source,
                event.detail_type,
                other.kind()
            ))),
        }
    }

    pub fn decode(body: &str) -> Result<Self> {
        Self::from_event(&CloudWatchEvent::decode(body)?)
    }

    pub fn instance_id(&self) -> &str {
        match self {
            DrainRequest::Termination(action) => &action.instance_id,
            DrainRequest::SpotInterruption { instance_id } => instance_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DrainRequest::Termination(_) => "termination",
            DrainRequest::SpotInterruption { .. } => "spot",
        }
    }
}

pub struct Drainer {
    cluster: Arc<Cluster>,
    queue: Arc<dyn MessageQueue>,
    hooks: Arc<dyn LifecycleHooks>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    wait_timeout: Duration,
    visibility_timeout: Duration,
    max_in_flight: usize,
}

impl Drainer {
    pub fn new(
        cluster: Arc<Cluster>,
        queue: Arc<dyn MessageQueue>,
        hooks: Arc<dyn LifecycleHooks>,
        config: &DrainerConfig,
    ) -> Self {
        Self {
            cluster,
            queue,
            hooks,
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            wait_timeout: config.wait_timeout(),
            visibility_timeout: config.visibility_timeout(),
            max_in_flight: config.max_in_flight.max(1),
        }
    }

    /// Run one message to a terminal state
    pub async fn process(&self, message: QueueMessage) -> DrainState {
        let started = Instant::now();
        debug!(message_id = %message.id, state = DrainState::Received.as_str(), "message received");

        let request = match DrainRequest::decode(&message.body) {
            Ok(request) => request,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "dropping message");
                if let Err(e) = self.queue.ack(&message).await {
                    error!(message_id = %message.id, error = %e, "failed to ack dropped message");
                }
                telemetry::record_drain_outcome("unknown", DrainState::Dead.as_str(), started.elapsed());
                return DrainState::Dead;
            }
        };

        let kind = request.kind();
        let instance_id = request.instance_id().to_string();
        let state = match self.drive(&message, request).await {
            Ok(()) => {
                info!(message_id = %message.id, instance_id = %instance_id, kind, "drain complete");
                DrainState::Done
            }
            Err(e) => {
                error!(
                    message_id = %message.id,
                    instance_id = %instance_id,
                    kind,
                    error = %e,
                    "abandoning message"
                );
                DrainState::Abandoned
            }
        };
        telemetry::record_drain_outcome(kind, state.as_str(), started.elapsed());

        if state == DrainState::Done {
            if let Err(e) = self.prune().await {
                warn!(error = %e, "failed to prune departed exclusions");
            }
        }
        state
    }

    async fn drive(&self, message: &QueueMessage, request: DrainRequest) -> Result<()> {
        let instance_id = request.instance_id().to_string();
        debug!(instance_id = %instance_id, state = DrainState::Draining.as_str(), "draining node");
        self.cluster
            .drain_nodes(&[instance_id.as_str()])
            .await
            .context("drain node")?;

        match request {
            DrainRequest::SpotInterruption { .. } => {
                self.queue.ack(message).await.context("ack message")?;
            }
            DrainRequest::Termination(mut action) => {
                debug!(instance_id = %instance_id, state = DrainState::Waiting.as_str(), "waiting for shards to move");
                self.wait_drained(message, &mut action).await?;
                self.hooks
                    .complete(&action, LifecycleResult::Continue)
                    .await
                    .context("complete lifecycle action")?;
                info!(
                    instance_id = %instance_id,
                    heartbeats = action.heartbeats,
                    held_secs = action.age(Utc::now()).num_seconds(),
                    "lifecycle action completed"
                );
                self.queue.ack(message).await.context("ack message")?;
            }
        }
        Ok(())
    }

    /// Poll until the node holds no shards, heartbeating in between.
    ///
    /// Returning drops both intervals, which stops the heartbeat.
    async fn wait_drained(&self, message: &QueueMessage, action: &mut LifecycleAction) -> Result<()> {
        let deadline = tokio::time::sleep(self.wait_timeout);
        tokio::pin!(deadline);

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let state = match self.cluster.get_state().await {
                        Ok(state) => state,
                        Err(e) if e.kind() == ErrorKind::Transient => {
                            warn!(instance_id = %action.instance_id, error = %e, "shard poll failed, retrying");
                            continue;
                        }
                        Err(e) => return Err(e.context("poll shards")),
                    };
                    if let Err(e) = self.prune_departed(&state).await {
                        warn!(error = %e, "failed to prune departed exclusions");
                    }
                    if !state.has_node(&action.instance_id) {
                        info!(instance_id = %action.instance_id, "node left the cluster");
                        return Ok(());
                    }
                    let remaining = state.shards_on(&action.instance_id);
                    if remaining == 0 {
                        return Ok(());
                    }
                    debug!(instance_id = %action.instance_id, shards = remaining, "shards remaining");
                }
                _ = heartbeat.tick() => {
                    self.heartbeat(message, action).await?;
                }
                _ = &mut deadline => {
                    return Err(Error::Timeout(format!(
                        "{} still holds shards after {:?}",
                        action.instance_id, self.wait_timeout
                    )));
                }
            }
        }
    }

    async fn heartbeat(&self, message: &QueueMessage, action: &mut LifecycleAction) -> Result<()> {
        let (hook, visibility) = tokio::join!(
            self.hooks.record_heartbeat(action),
            self.queue.extend_visibility(message, self.visibility_timeout),
        );

        if let Err(e) = visibility {
            warn!(message_id = %message.id, error = %e, "failed to extend message visibility");
        }
        match hook {
            Ok(()) => {
                action.record_heartbeat(Utc::now());
                telemetry::record_heartbeat(true);
                debug!(instance_id = %action.instance_id, heartbeats = action.heartbeats, "heartbeat recorded");
                Ok(())
            }
            Err(e) => {
                telemetry::record_heartbeat(false);
                if e.kind() == ErrorKind::StateConflict {
                    return Err(e.context("record heartbeat"));
                }
                warn!(instance_id = %action.instance_id, error = %e, "heartbeat failed, retrying next interval");
                Ok(())
            }
        }
    }

    /// Undrain excluded names that are no longer cluster nodes
    pub async fn prune(&self) -> Result<Vec<String>> {
        let state = self.cluster.get_state().await?;
        self.prune_departed(&state).await
    }

    async fn prune_departed(&self, state: &ClusterState) -> Result<Vec<String>> {
        let departed = state.departed_exclusions();
        if departed.is_empty() {
            return Ok(departed);
        }
        if self.cluster.undrain_nodes(&departed).await? {
            info!(nodes = %departed.join(","), "pruned exclusions for departed nodes");
        }
        Ok(departed)
    }

    /// Receive and process messages until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(max_in_flight = self.max_in_flight, "drainer started");
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<DrainState> = JoinSet::new();

        loop {
            while let Some(Some(joined)) = tasks.join_next().now_or_never() {
                if let Err(e) = joined {
                    error!(error = %e, "drain task failed");
                }
            }
            telemetry::record_drains_in_flight(tasks.len());

            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            drop(permit);

            let received = tokio::select! {
                received = self.queue.receive() => received,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            match received {
                Ok(messages) if messages.is_empty() => {
                    // Quiet queue: spot nodes and completed terminations
                    // leave after their message was handled
                    match self.prune().await {
                        Ok(departed) if !departed.is_empty() => {
                            debug!(nodes = departed.len(), "pruned exclusions while idle");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "failed to prune departed exclusions"),
                    }
                }
                Ok(messages) => {
                    for message in messages {
                        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                            break;
                        };
                        let drainer = Arc::clone(&self);
                        tasks.spawn(async move {
                            let _permit = permit;
                            drainer.process(message).await
                        });
                    }
                    telemetry::record_drains_in_flight(tasks.len());
                }
                Err(e) => {
                    error!(error = %e, "failed to receive messages");
                    telemetry::record_loop_error("drain", e.error_type());
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        // Unacknowledged messages are redelivered after their visibility expires
        if !tasks.is_empty() {
            warn!(in_flight = tasks.len(), "stopping with messages in flight");
        }
        tasks.shutdown().await;
        telemetry::record_drains_in_flight(0);
        info!("drainer stopped");
    }
}
