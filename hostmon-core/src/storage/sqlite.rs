//! Embedded SQLite sink.

use super::{retention_cutoff, StorageSink, MAX_QUERY_ROWS};
use crate::error::{HostmonError, Result};
use crate::metrics::{unix_seconds, Snapshot, StoredMetricRow};
use crate::state::StateManager;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tracing::{debug, instrument};

const BACKEND: &str = "sqlite";

/// [`StorageSink`] over the local [`StateManager`] database.
#[derive(Clone)]
pub struct SqliteSink {
    state: StateManager,
}

impl SqliteSink {
    pub fn new(state: StateManager) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }
}

#[async_trait]
impl StorageSink for SqliteSink {
    #[instrument(skip(self, snapshot), fields(timestamp = snapshot.timestamp))]
    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        self.state
            .insert_snapshot(snapshot)
            .await
            .map(|_| ())
            .map_err(|e| HostmonError::WriteFailed { backend: BACKEND, reason: e.to_string() })
    }

    #[instrument(skip(self))]
    async fn query_range(&self, since: i64) -> Result<Vec<StoredMetricRow>> {
        self.state
            .metric_rows_since(since, MAX_QUERY_ROWS as i64)
            .await
            .map_err(|e| HostmonError::QueryFailed { backend: BACKEND, reason: e.to_string() })
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, retention: Duration) -> Result<u64> {
        let cutoff = retention_cutoff(unix_seconds(SystemTime::now()), retention);
        let deleted = self
            .state
            .delete_metrics_before(cutoff)
            .await
            .map_err(|e| HostmonError::CleanupFailed { backend: BACKEND, reason: e.to_string() })?;
        debug!(cutoff, deleted, "Retention cleanup");
        Ok(deleted)
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CounterReading, DiskStats, MemoryStats};
    use std::collections::BTreeMap;

    fn snapshot(timestamp: i64) -> Snapshot {
        let mut network = BTreeMap::new();
        let mut eth0 = CounterReading::zeroed("eth0", SystemTime::now());
        eth0.bytes_sent = 1_500;
        eth0.packets_received = 7;
        network.insert("eth0".to_string(), eth0);

        Snapshot {
            timestamp,
            cpu_percent: 33.0,
            memory: MemoryStats { total: 8_000, used: 2_000, percent: 25.0 },
            disk: DiskStats { path: "/".to_string(), total: 100, used: 10, percent: 10.0 },
            network,
            rates: BTreeMap::new(),
        }
    }

    async fn sink() -> SqliteSink {
        SqliteSink::new(StateManager::new_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_write_then_query_reproduces_fields() {
        let sink = sink().await;
        let snap = snapshot(1_700_000_000);
        sink.write(&snap).await.unwrap();

        let rows = sink.query_range(0).await.unwrap();
        assert_eq!(rows.len(), 1);

        let mut expected = StoredMetricRow::from(&snap);
        expected.id = rows[0].id;
        assert_eq!(rows[0], expected);
    }

    #[tokio::test]
    async fn test_query_caps_rows() {
        let sink = sink().await;
        for ts in 0..(MAX_QUERY_ROWS as i64 + 5) {
            sink.write(&snapshot(ts + 1)).await.unwrap();
        }

        let rows = sink.query_range(0).await.unwrap();
        assert_eq!(rows.len(), MAX_QUERY_ROWS);
        assert_eq!(rows[0].timestamp, MAX_QUERY_ROWS as i64 + 5);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_and_is_idempotent() {
        let sink = sink().await;
        let now = unix_seconds(SystemTime::now());
        let day = 86_400;

        sink.write(&snapshot(now - 90 * day)).await.unwrap();
        sink.write(&snapshot(now - 61 * day)).await.unwrap();
        sink.write(&snapshot(now - day)).await.unwrap();

        let retention = Duration::from_secs(60 * day as u64);
        assert_eq!(sink.cleanup(retention).await.unwrap(), 2);
        assert_eq!(sink.cleanup(retention).await.unwrap(), 0);

        let rows = sink.query_range(0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, now - day);
        assert_eq!(sink.state().count_interface_rows().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_interface_insert_leaves_no_parent_row() {
        let sink = sink().await;
        sqlx::query(
            "CREATE TRIGGER reject_interfaces BEFORE INSERT ON network_metrics \
             BEGIN SELECT RAISE(ABORT, 'interface rows rejected'); END",
        )
        .execute(sink.state().pool())
        .await
        .unwrap();

        let err = sink.write(&snapshot(1_700_000_000)).await.unwrap_err();
        assert!(matches!(err, HostmonError::WriteFailed { backend: "sqlite", .. }));
        assert!(err.to_string().contains("interface rows rejected"));

        assert_eq!(sink.state().count_metrics().await.unwrap(), 0);
        assert_eq!(sink.state().count_interface_rows().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_maps_to_write_failed() {
        let sink = sink().await;
        sink.state().pool().close().await;

        let err = sink.write(&snapshot(1)).await.unwrap_err();
        assert!(matches!(err, HostmonError::WriteFailed { backend: "sqlite", .. }));

        let err = sink.query_range(0).await.unwrap_err();
        assert!(matches!(err, HostmonError::QueryFailed { backend: "sqlite", .. }));
    }
}
