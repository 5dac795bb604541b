//! Snapshot persistence backends.
//!
//! Every backend implements [`StorageSink`]. The daemon picks one at startup
//! from [`Config::backend`]: the embedded SQLite store by default, or a remote
//! InfluxDB v2 bucket when Influx settings are configured.

use crate::config::{Config, StorageBackend};
use crate::error::Result;
use crate::metrics::{Snapshot, StoredMetricRow};
use crate::state::StateManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod influx;
mod sqlite;

pub use influx::InfluxSink;
pub use sqlite::SqliteSink;

/// Upper bound on rows returned by one [`StorageSink::query_range`] call.
pub const MAX_QUERY_ROWS: usize = 1000;

#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist one snapshot. Either all of it is stored or none of it is.
    async fn write(&self, snapshot: &Snapshot) -> Result<()>;

    /// Rows with `timestamp > since`, newest first, at most [`MAX_QUERY_ROWS`].
    async fn query_range(&self, since: i64) -> Result<Vec<StoredMetricRow>>;

    /// Delete rows older than `now - retention`. Returns the number of
    /// snapshots removed when the backend can tell.
    async fn cleanup(&self, retention: Duration) -> Result<u64>;

    fn name(&self) -> &'static str;
}

/// Open the backend selected by `config`.
pub async fn open_sink(config: &Config) -> Result<Arc<dyn StorageSink>> {
    match config.backend() {
        StorageBackend::Sqlite { path } => {
            info!(path = %path.display(), "Using SQLite storage");
            let state = StateManager::new(&path).await?;
            Ok(Arc::new(SqliteSink::new(state)))
        }
        StorageBackend::Influx(influx) => {
            info!(url = %influx.url, bucket = %influx.bucket, "Using InfluxDB storage");
            Ok(Arc::new(InfluxSink::new(influx)?))
        }
    }
}

/// Unix seconds of `now - retention`, saturating at 0.
pub(crate) fn retention_cutoff(now: i64, retention: Duration) -> i64 {
    let retention = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(retention).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_cutoff() {
        assert_eq!(retention_cutoff(1_000, Duration::from_secs(100)), 900);
        assert_eq!(retention_cutoff(1_000, Duration::from_secs(5_000)), 0);
        assert_eq!(retention_cutoff(1_000, Duration::MAX), 0);
    }

    #[tokio::test]
    async fn test_open_sink_defaults_to_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        };

        let sink = open_sink(&config).await.unwrap();
        assert_eq!(sink.name(), "sqlite");
        assert!(dir.path().join(crate::paths::DB_FILE_NAME).exists());
    }
}
