//! Router tests driven through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use hostmon_core::metrics::fake::FakeProbe;
use hostmon_core::metrics::{
    run_writer, BackpressurePolicy, Sampler, Snapshot, SnapshotQueue, StoredMetricRow,
};
use hostmon_core::observability::health::HealthStatus;
use hostmon_core::storage::SqliteSink;
use hostmon_core::{HealthChecker, HostmonError, Result, StateManager, StorageSink};
use hostmon_daemon::{router, AppState};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

struct Harness {
    probe: Arc<FakeProbe>,
    queue: Arc<SnapshotQueue>,
    sink: Arc<dyn StorageSink>,
    health: HealthChecker,
    sampler: Arc<Sampler>,
}

impl Harness {
    async fn new() -> Self {
        let sink = Arc::new(SqliteSink::new(StateManager::new_in_memory().await.unwrap()));
        Self::with_sink(sink)
    }

    fn with_sink(sink: Arc<dyn StorageSink>) -> Self {
        Self::with_queue(sink, SnapshotQueue::new(8, BackpressurePolicy::DropOldest))
    }

    fn with_queue(sink: Arc<dyn StorageSink>, queue: SnapshotQueue) -> Self {
        let probe = Arc::new(FakeProbe::new());
        let sampler = Arc::new(Sampler::new(probe.clone(), "/"));
        Self {
            probe,
            queue: Arc::new(queue),
            sink,
            health: HealthChecker::new(),
            sampler,
        }
    }

    fn state(&self) -> AppState {
        AppState {
            sampler: self.sampler.clone(),
            queue: self.queue.clone(),
            sink: self.sink.clone(),
            health: self.health.clone(),
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = router(self.state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

struct BrokenSink;

#[async_trait]
impl StorageSink for BrokenSink {
    async fn write(&self, _snapshot: &Snapshot) -> Result<()> {
        Err(HostmonError::WriteFailed { backend: "broken", reason: "offline".to_string() })
    }

    async fn query_range(&self, _since: i64) -> Result<Vec<StoredMetricRow>> {
        Err(HostmonError::QueryFailed { backend: "broken", reason: "offline".to_string() })
    }

    async fn cleanup(&self, _retention: Duration) -> Result<u64> {
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Sink whose writes never complete.
struct StalledSink;

#[async_trait]
impl StorageSink for StalledSink {
    async fn write(&self, _snapshot: &Snapshot) -> Result<()> {
        std::future::pending().await
    }

    async fn query_range(&self, _since: i64) -> Result<Vec<StoredMetricRow>> {
        Ok(Vec::new())
    }

    async fn cleanup(&self, _retention: Duration) -> Result<u64> {
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new().await;
    let (status, body) = harness.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_metrics_returns_snapshot_and_enqueues_it() {
    let harness = Harness::new().await;
    harness.probe.set_cpu(42.0);
    harness.probe.set_interface_bytes("eth0", 1000, 2000);

    let (status, body) = harness.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cpu_percent"], 42.0);
    assert_eq!(body["network"]["eth0"]["bytes_sent"], 1000);
    assert!(body["rates"].as_object().unwrap().is_empty());
    assert_eq!(harness.queue.len(), 1);

    harness.probe.advance(Duration::from_secs(1));
    harness.probe.set_interface_bytes("eth0", 1500, 2000);
    let (_, body) = harness.get("/metrics").await;
    assert_eq!(body["rates"]["eth0"]["bytes_sent_per_sec"], 500.0);
    assert_eq!(harness.queue.len(), 2);
}

#[tokio::test]
async fn test_metrics_not_blocked_by_stalled_storage() {
    let harness =
        Harness::with_queue(Arc::new(StalledSink), SnapshotQueue::new(1, BackpressurePolicy::Block));
    let writer = tokio::spawn(run_writer(harness.queue.clone(), harness.sink.clone(), None));

    for attempt in 0..4 {
        let (status, _) = tokio::time::timeout(Duration::from_secs(2), harness.get("/metrics"))
            .await
            .unwrap_or_else(|_| panic!("request {} waited on storage", attempt));
        assert_eq!(status, StatusCode::OK);
    }

    // One snapshot is stuck in the writer, one fills the queue, the rest were refused.
    assert_eq!(harness.queue.len(), 1);
    assert!(harness.queue.dropped_total() >= 2);
    writer.abort();
}

#[tokio::test]
async fn test_metrics_probe_failure_is_500() {
    let harness = Harness::new().await;
    harness.probe.fail(Some("memory"));

    let (status, body) = harness.get("/metrics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("could not read system state"));
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn test_history_empty_window() {
    let harness = Harness::new().await;
    let (status, body) = harness.get("/metrics/history?duration=1h").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cpu"], Value::Array(vec![]));
    assert_eq!(body["memory"], Value::Array(vec![]));
    assert_eq!(body["disk"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_history_rejects_bad_durations() {
    let harness = Harness::new().await;

    for uri in [
        "/metrics/history?duration=bogus",
        "/metrics/history?duration=-1h",
        "/metrics/history?duration=0",
        "/metrics/history?duration=",
        "/metrics/history?duration=1h&resolution=weekly",
    ] {
        let (status, body) = harness.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn test_history_returns_ascending_series_within_window() {
    let harness = Harness::new().await;
    let now = now();

    for (offset, cpu) in [(7_200, 1.0), (600, 2.0), (300, 3.0)] {
        harness.probe.set_cpu(cpu);
        let mut snapshot = harness.sampler.collect().await.unwrap();
        snapshot.timestamp = now - offset;
        harness.sink.write(&snapshot).await.unwrap();
    }

    let (status, body) = harness.get("/metrics/history?duration=1h").await;
    assert_eq!(status, StatusCode::OK);

    let cpu = body["cpu"].as_array().unwrap();
    assert_eq!(cpu.len(), 2);
    assert_eq!(cpu[0]["timestamp"], now - 600);
    assert_eq!(cpu[0]["value"], 2.0);
    assert_eq!(cpu[1]["value"], 3.0);
    assert_eq!(body["memory"].as_array().unwrap().len(), 2);

    let (_, body) = harness.get("/metrics/history").await;
    assert_eq!(body["cpu"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_history_storage_failure_is_500() {
    let harness = Harness::with_sink(Arc::new(BrokenSink));
    let (status, body) = harness.get("/metrics/history?duration=1h").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("could not read history store"));
}

#[tokio::test]
async fn test_summary() {
    let harness = Harness::new().await;
    let (status, body) = harness.get("/summary").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vcpu_count"], 4);
    assert_eq!(body["hostname"], "fakehost");

    harness.probe.fail(Some("summary"));
    let (status, _) = harness.get("/summary").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_ready_reports_unhealthy_as_503() {
    let harness = Harness::new().await;
    harness.health.register_subsystem("storage").await;

    let (status, body) = harness.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    harness.health.update_subsystem("storage", HealthStatus::Unhealthy, None).await;
    let (status, body) = harness.get("/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["subsystems"]["storage"]["status"], "unhealthy");
}
