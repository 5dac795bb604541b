//! Database migrations.

use crate::error::{HostmonError, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 2;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version(pool).await?;

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    if current_version < 2 {
        migrate_to_v2(pool).await?;
    }

    Ok(())
}

/// Highest applied schema version, 0 for a fresh database.
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;
    Ok(version.unwrap_or(0))
}

async fn set_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;
    Ok(())
}

/// Snapshot parent rows and per-interface child rows.
#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            cpu_percent REAL NOT NULL,
            memory_percent REAL NOT NULL,
            memory_total INTEGER NOT NULL,
            memory_used INTEGER NOT NULL,
            disk_percent REAL NOT NULL,
            disk_total INTEGER NOT NULL,
            disk_used INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp)")
        .execute(pool)
        .await
        .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS network_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metric_id INTEGER NOT NULL,
            interface_name TEXT NOT NULL,
            bytes_sent INTEGER NOT NULL,
            bytes_received INTEGER NOT NULL,
            packets_sent INTEGER NOT NULL,
            packets_received INTEGER NOT NULL,
            FOREIGN KEY (metric_id) REFERENCES metrics(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 1).await?;

    info!("Migration to version 1 complete");
    Ok(())
}

/// Error and drop counters per interface, plus the child lookup index.
#[instrument(skip(pool))]
async fn migrate_to_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 2");

    for column in ["errors_in", "errors_out", "drops_in", "drops_out"] {
        let exists: Option<String> = sqlx::query_scalar(
            "SELECT name FROM pragma_table_info('network_metrics') WHERE name = ?",
        )
        .bind(column)
        .fetch_optional(pool)
        .await
        .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;

        if exists.is_none() {
            sqlx::query(&format!(
                "ALTER TABLE network_metrics ADD COLUMN {} INTEGER NOT NULL DEFAULT 0",
                column
            ))
            .execute(pool)
            .await
            .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;
        }
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_network_metrics_metric_id ON network_metrics(metric_id)",
    )
    .execute(pool)
    .await
    .map_err(|e| HostmonError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 2).await?;

    info!("Migration to version 2 complete");
    Ok(())
}
