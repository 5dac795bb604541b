//! Graceful shutdown handling for hostmond.
//!
//! A single broadcast channel fans the OS signal out to the scheduler and the
//! HTTP server. Once both have stopped, the persistence queue is closed and the
//! writer drains what is left.

use hostmon_core::metrics::SnapshotQueue;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Upper bound on how long the writer may take to flush queued snapshots.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the shutdown channel and start listening for SIGINT and SIGTERM.
///
/// Subscribe to the returned sender once per task that must stop.
pub fn shutdown_signal() -> broadcast::Sender<()> {
    let (tx, _) = broadcast::channel(1);
    let notify = tx.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate => {
                info!("Received SIGTERM");
            }
        }

        let _ = notify.send(());
    });

    tx
}

/// Close `queue` and wait up to `timeout` for the writer to flush it.
pub async fn drain_writer(queue: &SnapshotQueue, writer: JoinHandle<()>, timeout: Duration) {
    queue.close();
    let pending = queue.len();
    if pending > 0 {
        info!(pending, "Flushing queued snapshots");
    }

    match tokio::time::timeout(timeout, writer).await {
        Ok(Ok(())) => info!("Snapshot writer drained"),
        Ok(Err(e)) => error!("Snapshot writer task failed: {}", e),
        Err(_) => warn!(
            remaining = queue.len(),
            "Snapshot writer did not drain in time, dropping remaining snapshots"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostmon_core::metrics::BackpressurePolicy;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_waits_for_writer() {
        let queue = Arc::new(SnapshotQueue::new(4, BackpressurePolicy::DropOldest));
        let consumer = queue.clone();
        let writer = tokio::spawn(async move { while consumer.pop().await.is_some() {} });

        drain_writer(&queue, writer, Duration::from_secs(1)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stuck_writer() {
        let queue = SnapshotQueue::new(4, BackpressurePolicy::DropOldest);
        let writer = tokio::spawn(std::future::pending::<()>());

        let started = std::time::Instant::now();
        drain_writer(&queue, writer, Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
