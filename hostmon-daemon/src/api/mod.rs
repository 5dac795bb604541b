//! HTTP API.
//!
//! Routes:
//! - `GET /metrics`: fresh snapshot through the shared sampler
//! - `GET /metrics/history`: stored series over a Go-style duration window
//! - `GET /health`, `GET /health/ready`: liveness and subsystem readiness
//! - `GET /summary`: static host facts

mod error;
mod handlers;

pub use error::ApiError;

use axum::routing::get;
use axum::Router;
use hostmon_core::metrics::{Sampler, SnapshotQueue};
use hostmon_core::{HealthChecker, StorageSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub sampler: Arc<Sampler>,
    pub queue: Arc<SnapshotQueue>,
    pub sink: Arc<dyn StorageSink>,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/history", get(handlers::history))
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::ready))
        .route("/summary", get(handlers::summary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("HTTP API stopped");
    Ok(())
}
