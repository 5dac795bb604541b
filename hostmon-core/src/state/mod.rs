//! SQLite persistence for collected snapshots.
//!
//! The StateManager owns the connection pool and schema, and exposes the row
//! level operations the SQLite storage sink is built on:
//! - snapshot insert (parent row plus one row per interface, one transaction)
//! - range reads, newest first
//! - deletion of rows older than a cutoff (children cascade)

use crate::error::{HostmonError, Result};
use crate::metrics::{Snapshot, StoredInterfaceRow, StoredMetricRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, Row};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

pub mod migrations;


const MEMORY_DB: &str = ":memory:";

/// State manager for persistent storage.
#[derive(Clone)]
pub struct StateManager {
    pool: SqlitePool,
}

impl StateManager {
    /// Create a new StateManager with an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(MEMORY_DB).await
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new StateManager with a database at the specified path.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Initializing state manager at {:?}", db_path);

        let in_memory = db_path == Path::new(MEMORY_DB);
        if !in_memory {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| HostmonError::IoError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_path.to_str().ok_or_else(|| {
            HostmonError::InvalidConfig { reason: "Invalid database path".to_string() }
        })?)
        .map_err(|e| HostmonError::DatabaseError(e.to_string()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .log_statements(tracing::log::LevelFilter::Debug);

        // Every connection to ":memory:" is its own database, so keep exactly one alive.
        let pool_options = if in_memory {
            SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| HostmonError::DatabaseError(e.to_string()))?;

        let manager = Self { pool };
        manager.run_migrations().await?;

        info!("State manager initialized successfully");
        Ok(manager)
    }

    #[instrument(skip(self))]
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Insert a snapshot and its interface rows atomically. Returns the parent row id.
    #[instrument(skip(self, snapshot), fields(timestamp = snapshot.timestamp))]
    pub async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<i64> {
        let db_err = |e: sqlx::Error| HostmonError::DatabaseError(e.to_string());
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let metric_id = sqlx::query(
            r#"
            INSERT INTO metrics (timestamp, cpu_percent, memory_percent, memory_total, memory_used,
                                 disk_percent, disk_total, disk_used)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.cpu_percent)
        .bind(snapshot.memory.percent)
        .bind(snapshot.memory.total as i64)
        .bind(snapshot.memory.used as i64)
        .bind(snapshot.disk.percent)
        .bind(snapshot.disk.total as i64)
        .bind(snapshot.disk.used as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        for reading in snapshot.network.values() {
            sqlx::query(
                r#"
                INSERT INTO network_metrics (metric_id, interface_name, bytes_sent, bytes_received,
                                             packets_sent, packets_received, errors_in, errors_out,
                                             drops_in, drops_out)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(metric_id)
            .bind(&reading.interface)
            .bind(reading.bytes_sent as i64)
            .bind(reading.bytes_received as i64)
            .bind(reading.packets_sent as i64)
            .bind(reading.packets_received as i64)
            .bind(reading.errors_in as i64)
            .bind(reading.errors_out as i64)
            .bind(reading.drops_in as i64)
            .bind(reading.drops_out as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;

        debug!(metric_id, interfaces = snapshot.network.len(), "Snapshot stored");
        Ok(metric_id)
    }

    /// Rows with `timestamp > since`, newest first, at most `limit`.
    #[instrument(skip(self))]
    pub async fn metric_rows_since(&self, since: i64, limit: i64) -> Result<Vec<StoredMetricRow>> {
        let db_err = |e: sqlx::Error| HostmonError::DatabaseError(e.to_string());

        let parents = sqlx::query(
            r#"
            SELECT id, timestamp, cpu_percent, memory_percent, memory_total, memory_used,
                   disk_percent, disk_total, disk_used
            FROM metrics
            WHERE timestamp > ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if parents.is_empty() {
            return Ok(Vec::new());
        }

        let children = sqlx::query(
            r#"
            SELECT n.metric_id, n.interface_name, n.bytes_sent, n.bytes_received, n.packets_sent,
                   n.packets_received, n.errors_in, n.errors_out, n.drops_in, n.drops_out
            FROM network_metrics n
            JOIN (
                SELECT id FROM metrics
                WHERE timestamp > ?
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
            ) m ON n.metric_id = m.id
            ORDER BY n.id
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut interfaces: HashMap<i64, Vec<StoredInterfaceRow>> = HashMap::new();
        for row in &children {
            let metric_id: i64 = row.try_get("metric_id").map_err(db_err)?;
            interfaces.entry(metric_id).or_default().push(row_to_interface(row)?);
        }

        parents
            .iter()
            .map(|row| {
                let mut metric = row_to_metric(row)?;
                if let Some(id) = metric.id {
                    metric.interfaces = interfaces.remove(&id).unwrap_or_default();
                }
                Ok(metric)
            })
            .collect()
    }

    /// Delete parent rows with `timestamp < cutoff`. Interface rows cascade.
    #[instrument(skip(self))]
    pub async fn delete_metrics_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metrics WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| HostmonError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Number of stored snapshots.
    pub async fn count_metrics(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM metrics")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HostmonError::DatabaseError(e.to_string()))
    }

    /// Number of stored interface rows.
    pub async fn count_interface_rows(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM network_metrics")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HostmonError::DatabaseError(e.to_string()))
    }
}

fn get_u64(row: &SqliteRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column).map_err(|e| HostmonError::DatabaseError(e.to_string()))?;
    Ok(value.max(0) as u64)
}

fn row_to_metric(row: &SqliteRow) -> Result<StoredMetricRow> {
    let db_err = |e: sqlx::Error| HostmonError::DatabaseError(e.to_string());
    Ok(StoredMetricRow {
        id: Some(row.try_get("id").map_err(db_err)?),
        timestamp: row.try_get("timestamp").map_err(db_err)?,
        cpu_percent: row.try_get("cpu_percent").map_err(db_err)?,
        memory_percent: row.try_get("memory_percent").map_err(db_err)?,
        memory_total: get_u64(row, "memory_total")?,
        memory_used: get_u64(row, "memory_used")?,
        disk_percent: row.try_get("disk_percent").map_err(db_err)?,
        disk_total: get_u64(row, "disk_total")?,
        disk_used: get_u64(row, "disk_used")?,
        interfaces: Vec::new(),
    })
}

fn row_to_interface(row: &SqliteRow) -> Result<StoredInterfaceRow> {
    Ok(StoredInterfaceRow {
        interface: row
            .try_get("interface_name")
            .map_err(|e| HostmonError::DatabaseError(e.to_string()))?,
        bytes_sent: get_u64(row, "bytes_sent")?,
        bytes_received: get_u64(row, "bytes_received")?,
        packets_sent: get_u64(row, "packets_sent")?,
        packets_received: get_u64(row, "packets_received")?,
        errors_in: get_u64(row, "errors_in")?,
        errors_out: get_u64(row, "errors_out")?,
        drops_in: get_u64(row, "drops_in")?,
        drops_out: get_u64(row, "drops_out")?,
    })
}
