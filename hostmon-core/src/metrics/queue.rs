//! Bounded hand-off from snapshot producers to the storage writer.
//!
//! Producers never wait on storage I/O directly. When the queue is full the
//! configured [`BackpressurePolicy`] decides whether the oldest queued snapshot
//! is discarded or the scheduler waits for space. HTTP handlers use
//! [`SnapshotQueue::try_push`] and never wait.

use super::types::Snapshot;
use crate::error::HostmonError;
use crate::observability::health::{HealthChecker, HealthStatus};
use crate::observability::metrics as obs;
use crate::storage::StorageSink;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// What a full queue does with a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// Evict the oldest queued snapshot; producers never wait.
    #[default]
    DropOldest,
    /// Producers wait until the writer frees a slot.
    Block,
}

impl BackpressurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop-oldest",
            Self::Block => "block",
        }
    }
}

impl std::fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BackpressurePolicy {
    type Err = HostmonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" => Ok(Self::DropOldest),
            "block" => Ok(Self::Block),
            other => Err(HostmonError::InvalidConfig {
                reason: format!("unknown backpressure policy '{}'", other),
            }),
        }
    }
}

/// Result of offering a snapshot to the queue.
#[derive(Debug)]
pub enum PushOutcome {
    Queued,
    /// The queue was full; this older snapshot was discarded to make room.
    DroppedOldest(Box<Snapshot>),
    /// The queue was full under the block policy and the caller chose not to wait.
    Full(Box<Snapshot>),
    /// The queue is closed and the snapshot was not accepted.
    Closed(Box<Snapshot>),
}

#[derive(Default)]
struct QueueInner {
    items: VecDeque<Snapshot>,
    closed: bool,
}

/// Bounded snapshot queue with an explicit backpressure policy.
pub struct SnapshotQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    policy: BackpressurePolicy,
    items_available: Notify,
    space_available: Notify,
    dropped: AtomicU64,
}

impl SnapshotQueue {
    pub fn new(capacity: usize, policy: BackpressurePolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity: capacity.max(1),
            policy,
            items_available: Notify::new(),
            space_available: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots discarded because the queue was full, since creation.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Offer a snapshot. Only waits under [`BackpressurePolicy::Block`].
    ///
    /// Request paths must use [`SnapshotQueue::try_push`] instead.
    pub async fn push(&self, mut snapshot: Snapshot) -> PushOutcome {
        loop {
            let space = self.space_available.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.offer(snapshot) {
                Ok(outcome) => return outcome,
                Err(rejected) => snapshot = rejected,
            }

            space.await;
        }
    }

    /// Offer a snapshot without waiting.
    ///
    /// Under [`BackpressurePolicy::Block`] a full queue hands the snapshot
    /// back as [`PushOutcome::Full`].
    pub fn try_push(&self, snapshot: Snapshot) -> PushOutcome {
        match self.offer(snapshot) {
            Ok(outcome) => outcome,
            Err(rejected) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                obs::record_snapshot_dropped();
                debug!(timestamp = rejected.timestamp, "Persistence queue full, snapshot not queued");
                PushOutcome::Full(Box::new(rejected))
            }
        }
    }

    /// Enqueue if the policy allows it right now; `Err` means "full, wait".
    fn offer(&self, snapshot: Snapshot) -> std::result::Result<PushOutcome, Snapshot> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(PushOutcome::Closed(Box::new(snapshot)));
        }
        if inner.items.len() < self.capacity {
            inner.items.push_back(snapshot);
            drop(inner);
            self.items_available.notify_one();
            return Ok(PushOutcome::Queued);
        }
        if self.policy == BackpressurePolicy::Block {
            return Err(snapshot);
        }

        let evicted = inner.items.pop_front();
        inner.items.push_back(snapshot);
        drop(inner);
        self.items_available.notify_one();
        match evicted {
            Some(evicted) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                obs::record_snapshot_dropped();
                debug!(timestamp = evicted.timestamp, "Persistence queue full, dropped oldest snapshot");
                Ok(PushOutcome::DroppedOldest(Box::new(evicted)))
            }
            None => Ok(PushOutcome::Queued),
        }
    }

    /// Wait for the next snapshot; `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Snapshot> {
        loop {
            let items = self.items_available.notified();
            tokio::pin!(items);
            items.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(snapshot) = inner.items.pop_front() {
                    drop(inner);
                    self.space_available.notify_one();
                    return Some(snapshot);
                }
                if inner.closed {
                    return None;
                }
            }

            items.await;
        }
    }

    /// Take the next snapshot without waiting.
    pub fn try_pop(&self) -> Option<Snapshot> {
        let snapshot = self.lock().items.pop_front();
        if snapshot.is_some() {
            self.space_available.notify_one();
        }
        snapshot
    }

    /// Stop accepting snapshots. Queued snapshots can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.items_available.notify_waiters();
        self.space_available.notify_waiters();
    }
}

/// Drain `queue` into `sink` until the queue is closed and empty.
///
/// Write failures are logged and counted; they never reach the producers.
pub async fn run_writer(
    queue: Arc<SnapshotQueue>,
    sink: Arc<dyn StorageSink>,
    health: Option<HealthChecker>,
) {
    info!(backend = sink.name(), "Snapshot writer started");

    while let Some(snapshot) = queue.pop().await {
        match sink.write(&snapshot).await {
            Ok(()) => {
                debug!(timestamp = snapshot.timestamp, "Persisted snapshot");
                if let Some(health) = &health {
                    health.update_subsystem("storage", HealthStatus::Healthy, None).await;
                }
            }
            Err(e) => {
                warn!(backend = sink.name(), timestamp = snapshot.timestamp, error = %e, "Failed to persist snapshot");
                obs::record_storage_failure(sink.name(), "write");
                if let Some(health) = &health {
                    health
                        .update_subsystem("storage", HealthStatus::Degraded, Some(e.to_string()))
                        .await;
                }
            }
        }
    }

    info!(backend = sink.name(), "Snapshot writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::{DiskStats, MemoryStats};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn snapshot(timestamp: i64) -> Snapshot {
        Snapshot {
            timestamp,
            cpu_percent: 0.0,
            memory: MemoryStats { total: 1, used: 0, percent: 0.0 },
            disk: DiskStats { path: "/".into(), total: 1, used: 0, percent: 0.0 },
            network: BTreeMap::new(),
            rates: BTreeMap::new(),
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("drop-oldest".parse::<BackpressurePolicy>().unwrap(), BackpressurePolicy::DropOldest);
        assert_eq!("BLOCK".parse::<BackpressurePolicy>().unwrap(), BackpressurePolicy::Block);
        assert!("whatever".parse::<BackpressurePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = SnapshotQueue::new(4, BackpressurePolicy::Block);
        for ts in 1..=3 {
            assert!(matches!(queue.push(snapshot(ts)).await, PushOutcome::Queued));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().await.unwrap().timestamp, 1);
        assert_eq!(queue.pop().await.unwrap().timestamp, 2);
        assert_eq!(queue.pop().await.unwrap().timestamp, 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_drop_oldest_never_blocks() {
        let queue = SnapshotQueue::new(2, BackpressurePolicy::DropOldest);
        queue.push(snapshot(1)).await;
        queue.push(snapshot(2)).await;

        match queue.push(snapshot(3)).await {
            PushOutcome::DroppedOldest(evicted) => assert_eq!(evicted.timestamp, 1),
            other => panic!("expected eviction, got {:?}", other),
        }
        assert_eq!(queue.dropped_total(), 1);
        assert_eq!(queue.try_pop().unwrap().timestamp, 2);
        assert_eq!(queue.try_pop().unwrap().timestamp, 3);
    }

    #[tokio::test]
    async fn test_block_waits_for_space() {
        let queue = Arc::new(SnapshotQueue::new(1, BackpressurePolicy::Block));
        queue.push(snapshot(1)).await;

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(snapshot(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished(), "producer should wait while the queue is full");

        assert_eq!(queue.pop().await.unwrap().timestamp, 1);
        let outcome = tokio::time::timeout(Duration::from_secs(1), producer).await.unwrap().unwrap();
        assert!(matches!(outcome, PushOutcome::Queued));
        assert_eq!(queue.pop().await.unwrap().timestamp, 2);
        assert_eq!(queue.dropped_total(), 0);
    }

    #[tokio::test]
    async fn test_try_push_never_waits_under_block() {
        let queue = SnapshotQueue::new(1, BackpressurePolicy::Block);
        assert_eq!(queue.policy(), BackpressurePolicy::Block);
        assert_eq!(queue.capacity(), 1);

        assert!(matches!(queue.try_push(snapshot(1)), PushOutcome::Queued));
        match queue.try_push(snapshot(2)) {
            PushOutcome::Full(rejected) => assert_eq!(rejected.timestamp, 2),
            other => panic!("expected Full, got {:?}", other),
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped_total(), 1);
        assert_eq!(queue.try_pop().unwrap().timestamp, 1);
    }

    #[tokio::test]
    async fn test_try_push_evicts_under_drop_oldest() {
        let queue = SnapshotQueue::new(0, BackpressurePolicy::DropOldest);
        assert_eq!(queue.capacity(), 1);

        queue.try_push(snapshot(1));
        match queue.try_push(snapshot(2)) {
            PushOutcome::DroppedOldest(evicted) => assert_eq!(evicted.timestamp, 1),
            other => panic!("expected eviction, got {:?}", other),
        }
        assert_eq!(queue.try_pop().unwrap().timestamp, 2);

        queue.close();
        assert!(matches!(queue.try_push(snapshot(3)), PushOutcome::Closed(_)));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = Arc::new(SnapshotQueue::new(4, BackpressurePolicy::DropOldest));
        queue.push(snapshot(1)).await;
        queue.close();

        assert!(matches!(queue.push(snapshot(2)).await, PushOutcome::Closed(_)));
        assert_eq!(queue.pop().await.unwrap().timestamp, 1);
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = Arc::new(SnapshotQueue::new(4, BackpressurePolicy::DropOldest));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert!(popped.is_none());
    }
}
