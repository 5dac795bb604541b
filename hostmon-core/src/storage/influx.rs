//! Remote InfluxDB v2 sink.
//!
//! Snapshots are written in line protocol with second precision: one
//! `system_metrics` point plus one `network_metrics` point per interface, all
//! in a single write request. History is read back with Flux and parsed from
//! the CSV response body.

use super::{retention_cutoff, StorageSink, MAX_QUERY_ROWS};
use crate::config::InfluxConfig;
use crate::error::{HostmonError, Result};
use crate::metrics::{unix_seconds, Snapshot, StoredMetricRow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, SystemTime};
use tracing::{debug, instrument};

const BACKEND: &str = "influx";
const SYSTEM_MEASUREMENT: &str = "system_metrics";
const NETWORK_MEASUREMENT: &str = "network_metrics";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct InfluxSink {
    client: Client,
    config: InfluxConfig,
}

impl InfluxSink {
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| {
            HostmonError::InvalidConfig { reason: format!("failed to build InfluxDB client: {}", e) }
        })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Token {}", self.config.token))
    }
}

#[async_trait]
impl StorageSink for InfluxSink {
    #[instrument(skip(self, snapshot), fields(timestamp = snapshot.timestamp))]
    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let fail = |reason: String| HostmonError::WriteFailed { backend: BACKEND, reason };
        let body = encode_snapshot(snapshot);

        let response = self
            .authorized(self.client.post(self.endpoint("/api/v2/write")))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "s"),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        check_status(response).await.map_err(fail)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_range(&self, since: i64) -> Result<Vec<StoredMetricRow>> {
        let fail = |reason: String| HostmonError::QueryFailed { backend: BACKEND, reason };

        let response = self
            .authorized(self.client.post(self.endpoint("/api/v2/query")))
            .query(&[("org", self.config.org.as_str())])
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(history_query(&self.config.bucket, since, MAX_QUERY_ROWS))
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let body = check_status(response).await.map_err(fail)?;
        let mut rows = parse_history_csv(&body)?;

        // Flux range start is inclusive.
        rows.retain(|row| row.timestamp > since);
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(MAX_QUERY_ROWS);
        debug!(rows = rows.len(), "InfluxDB history query");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, retention: Duration) -> Result<u64> {
        let fail = |reason: String| HostmonError::CleanupFailed { backend: BACKEND, reason };
        let cutoff = retention_cutoff(unix_seconds(SystemTime::now()), retention);
        if cutoff == 0 {
            return Ok(0);
        }

        // The delete range is inclusive at both ends.
        let body = serde_json::json!({
            "start": rfc3339(0).map_err(fail)?,
            "stop": rfc3339(cutoff - 1).map_err(fail)?,
        });

        let response = self
            .authorized(self.client.post(self.endpoint("/api/v2/delete")))
            .query(&[("org", self.config.org.as_str()), ("bucket", self.config.bucket.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        check_status(response).await.map_err(fail)?;
        debug!(cutoff, "InfluxDB retention delete issued");
        Ok(0)
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

async fn check_status(response: Response) -> std::result::Result<String, String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| e.to_string())?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(format!("HTTP {}: {}", status, body.trim()))
    }
}

fn rfc3339(unix_secs: i64) -> std::result::Result<String, String> {
    Utc.timestamp_opt(unix_secs, 0)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| format!("timestamp {} out of range", unix_secs))
}

/// Escape a tag key or value (commas, equals signs, spaces).
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn float_field(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "0".to_string()
    }
}

fn int_field(value: u64) -> String {
    format!("{}i", value.min(i64::MAX as u64))
}

/// Line protocol for one snapshot, one line per point.
pub(crate) fn encode_snapshot(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let ts = snapshot.timestamp;

    let _ = writeln!(
        out,
        "{} cpu_percent={},memory_percent={},memory_total={},memory_used={},disk_percent={},disk_total={},disk_used={} {}",
        SYSTEM_MEASUREMENT,
        float_field(snapshot.cpu_percent),
        float_field(snapshot.memory.percent),
        int_field(snapshot.memory.total),
        int_field(snapshot.memory.used),
        float_field(snapshot.disk.percent),
        int_field(snapshot.disk.total),
        int_field(snapshot.disk.used),
        ts
    );

    for reading in snapshot.network.values() {
        let _ = writeln!(
            out,
            "{},interface={} bytes_sent={},bytes_received={},packets_sent={},packets_received={},errors_in={},errors_out={},drops_in={},drops_out={} {}",
            NETWORK_MEASUREMENT,
            escape_tag(&reading.interface),
            int_field(reading.bytes_sent),
            int_field(reading.bytes_received),
            int_field(reading.packets_sent),
            int_field(reading.packets_received),
            int_field(reading.errors_in),
            int_field(reading.errors_out),
            int_field(reading.drops_in),
            int_field(reading.drops_out),
            ts
        );
    }

    out
}

fn flux_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Flux query for parent rows newer than `since`, newest first.
pub(crate) fn history_query(bucket: &str, since: i64, limit: usize) -> String {
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: {start})
  |> filter(fn: (r) => r._measurement == "{measurement}")
  |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")
  |> group()
  |> sort(columns: ["_time"], desc: true)
  |> limit(n: {limit})"#,
        bucket = flux_string(bucket),
        start = since.saturating_add(1),
        measurement = SYSTEM_MEASUREMENT,
        limit = limit,
    )
}

/// Split one CSV record, honoring double-quoted cells.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

/// Parse the CSV body of a pivoted `system_metrics` query.
///
/// Each table starts with a header line; tables are separated by blank lines
/// and annotation lines begin with `#`.
pub(crate) fn parse_history_csv(body: &str) -> Result<Vec<StoredMetricRow>> {
    let fail = |reason: String| HostmonError::QueryFailed { backend: BACKEND, reason };
    let mut rows = Vec::new();
    let mut header: Option<HashMap<String, usize>> = None;

    for line in body.lines().map(|l| l.trim_end_matches('\r')) {
        if line.trim().is_empty() {
            header = None;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let cells = split_csv_line(line);
        if header.is_none() {
            header = Some(cells.into_iter().enumerate().map(|(i, name)| (name, i)).collect());
            continue;
        }
        let Some(columns) = header.as_ref() else { continue };

        let cell = |name: &str| columns.get(name).and_then(|&i| cells.get(i)).map(String::as_str);
        let float = |name: &str| cell(name).and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
        let int = |name: &str| {
            cell(name)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v.max(0.0) as u64)
                .unwrap_or(0)
        };

        let time = cell("_time").ok_or_else(|| fail("response row has no _time column".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(time)
            .map_err(|e| fail(format!("invalid _time '{}': {}", time, e)))?
            .timestamp();

        rows.push(StoredMetricRow {
            id: None,
            timestamp,
            cpu_percent: float("cpu_percent"),
            memory_percent: float("memory_percent"),
            memory_total: int("memory_total"),
            memory_used: int("memory_used"),
            disk_percent: float("disk_percent"),
            disk_total: int("disk_total"),
            disk_used: int("disk_used"),
            interfaces: Vec::new(),
        });
    }

    Ok(rows)
}
