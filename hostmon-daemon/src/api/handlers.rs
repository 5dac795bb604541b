use super::{ApiError, AppState};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use hostmon_core::duration::parse_duration;
use hostmon_core::metrics::{
    reconstruct, unix_seconds, HistoricalSeries, PushOutcome, Resolution, Snapshot, SystemSummary,
};
use hostmon_core::observability::health::{HealthStatus, Liveness, Readiness};
use hostmon_core::observability::metrics::record_api_request;
use serde::Deserialize;
use std::time::SystemTime;
use tracing::{debug, error, warn};

const DEFAULT_HISTORY_WINDOW: &str = "24h";

fn recorded<T>(endpoint: &'static str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    record_api_request(endpoint, status.as_u16());
    result
}

pub async fn metrics(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    let result = match state.sampler.collect().await {
        Ok(snapshot) => {
            match state.queue.try_push(snapshot.clone()) {
                PushOutcome::Queued | PushOutcome::DroppedOldest(_) => {}
                PushOutcome::Full(_) => warn!("Persistence queue full, request snapshot not stored"),
                PushOutcome::Closed(_) => {
                    warn!("Persistence queue closed, request snapshot not stored")
                }
            }
            Ok(Json(snapshot))
        }
        Err(e) => {
            error!(error = %e, "Live collection failed");
            Err(ApiError::system_state(e))
        }
    };
    recorded("metrics", result)
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    duration: Option<String>,
    resolution: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoricalSeries>, ApiError> {
    recorded("history", load_history(&state, params).await)
}

async fn load_history(
    state: &AppState,
    params: HistoryParams,
) -> Result<Json<HistoricalSeries>, ApiError> {
    let input = params.duration.as_deref().unwrap_or(DEFAULT_HISTORY_WINDOW);
    let window = parse_duration(input).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if window.is_zero() {
        return Err(ApiError::BadRequest(format!("duration must be positive, got '{}'", input)));
    }

    let resolution = match params.resolution.as_deref() {
        Some(raw) => raw.parse::<Resolution>().map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => Resolution::Raw,
    };

    let window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
    let since = unix_seconds(SystemTime::now()).saturating_sub(window_secs);

    let rows = state.sink.query_range(since).await.map_err(|e| {
        error!(error = %e, since, "History query failed");
        ApiError::history_store(e)
    })?;
    debug!(rows = rows.len(), since, ?resolution, "History query");

    Ok(Json(reconstruct(&rows).downsample(resolution)))
}

pub async fn health() -> Json<Liveness> {
    record_api_request("health", StatusCode::OK.as_u16());
    Json(Liveness::ok())
}

pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let report = state.health.readiness().await;
    let status = if report.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    record_api_request("ready", status.as_u16());
    (status, Json(report))
}

pub async fn summary(State(state): State<AppState>) -> Result<Json<SystemSummary>, ApiError> {
    let result = state.sampler.summary().await.map(Json).map_err(|e| {
        error!(error = %e, "Summary probe failed");
        ApiError::system_state(e)
    });
    recorded("summary", result)
}
