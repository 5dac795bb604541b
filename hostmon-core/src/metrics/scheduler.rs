//! Background collection and retention loop.

use super::queue::{PushOutcome, SnapshotQueue};
use super::sampler::Sampler;
use crate::observability::health::{HealthChecker, HealthStatus};
use crate::observability::metrics as obs;
use crate::storage::StorageSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Timing for the background loop.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub collect_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention: Duration,
}

/// Drives the shared [`Sampler`] on a fixed period and runs retention cleanup.
pub struct Scheduler {
    sampler: Arc<Sampler>,
    queue: Arc<SnapshotQueue>,
    sink: Arc<dyn StorageSink>,
    config: ScheduleConfig,
    health: Option<HealthChecker>,
}

impl Scheduler {
    pub fn new(
        sampler: Arc<Sampler>,
        queue: Arc<SnapshotQueue>,
        sink: Arc<dyn StorageSink>,
        config: ScheduleConfig,
    ) -> Self {
        Self { sampler, queue, sink, config, health: None }
    }

    /// Report sampler and cleanup status to a health checker.
    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until `shutdown` fires. A failed cycle is logged and skipped.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            collect_interval = ?self.config.collect_interval,
            cleanup_interval = ?self.config.cleanup_interval,
            retention = ?self.config.retention,
            "Scheduler started"
        );

        let mut collect_tick = tokio::time::interval(self.config.collect_interval);
        collect_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cleanup_tick = tokio::time::interval(self.config.cleanup_interval);
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = collect_tick.tick() => self.collect_once().await,
                _ = cleanup_tick.tick() => self.cleanup_once().await,
            }
        }

        info!("Scheduler stopped");
    }

    /// One collection cycle: sample and enqueue for persistence.
    pub async fn collect_once(&self) {
        match self.sampler.collect().await {
            Ok(snapshot) => {
                debug!(timestamp = snapshot.timestamp, "Collected snapshot");
                self.set_health("sampler", HealthStatus::Healthy, None).await;
                match self.queue.push(snapshot).await {
                    PushOutcome::Queued | PushOutcome::DroppedOldest(_) | PushOutcome::Full(_) => {}
                    PushOutcome::Closed(_) => warn!("Persistence queue closed, snapshot not stored"),
                }
            }
            Err(e) => {
                error!(error = %e, "Collection cycle failed, skipping");
                self.set_health("sampler", HealthStatus::Degraded, Some(e.to_string())).await;
            }
        }
    }

    /// Delete rows older than the retention window.
    pub async fn cleanup_once(&self) {
        match self.sink.cleanup(self.config.retention).await {
            Ok(deleted) => {
                obs::record_cleanup(self.sink.name(), deleted);
                if deleted > 0 {
                    info!(deleted, backend = self.sink.name(), "Retention cleanup removed rows");
                }
            }
            Err(e) => {
                warn!(backend = self.sink.name(), error = %e, "Retention cleanup failed");
                obs::record_storage_failure(self.sink.name(), "cleanup");
            }
        }
    }

    async fn set_health(&self, subsystem: &str, status: HealthStatus, message: Option<String>) {
        if let Some(health) = &self.health {
            health.update_subsystem(subsystem, status, message).await;
        }
    }
}
