//! Periodic tick source that drops ticks instead of queueing them
//!
//! A background task offers a tick into a one-slot channel every period.
//! If the consumer has not taken the previous tick yet, the new one is
//! dropped and counted as skipped.

use crate::telemetry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub struct Ticker {
    rx: mpsc::Receiver<Instant>,
    skipped: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Start ticking immediately, then every `period`
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(1);
        let skipped = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&skipped);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let at = interval.tick().await;
                match tx.try_send(at) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                        telemetry::record_tick_skipped(&name);
                        debug!(ticker = %name, "previous tick still pending, skipping");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        });

        Self {
            rx,
            skipped,
            handle,
        }
    }

    /// Wait for the next tick
    pub async fn tick(&mut self) -> Option<Instant> {
        self.rx.recv().await
    }

    /// Ticks dropped so far
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
