//! Liveness and subsystem readiness reporting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Agent version reported by `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed liveness body: `{"status": "ok", "version": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveness {
    pub status: String,
    pub version: String,
}

impl Liveness {
    pub fn ok() -> Self {
        Self { status: "ok".to_string(), version: VERSION.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Readiness body for `/health/ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    /// Worst status across subsystems.
    pub status: HealthStatus,
    pub version: String,
    pub subsystems: BTreeMap<String, SubsystemHealth>,
}

/// Tracks the last known status of the sampler and storage paths.
#[derive(Clone, Default)]
pub struct HealthChecker {
    subsystems: Arc<RwLock<BTreeMap<String, SubsystemHealth>>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `name` as healthy.
    pub async fn register_subsystem(&self, name: &str) {
        self.subsystems
            .write()
            .await
            .entry(name.to_string())
            .or_insert(SubsystemHealth { status: HealthStatus::Healthy, message: None });
    }

    /// Record a new status. Unregistered names are ignored.
    pub async fn update_subsystem(&self, name: &str, status: HealthStatus, message: Option<String>) {
        if let Some(subsystem) = self.subsystems.write().await.get_mut(name) {
            subsystem.status = status;
            subsystem.message = message;
        }
    }

    pub async fn readiness(&self) -> Readiness {
        let subsystems = self.subsystems.read().await.clone();
        let status =
            subsystems.values().map(|s| s.status).max().unwrap_or(HealthStatus::Healthy);
        Readiness { status, version: VERSION.to_string(), subsystems }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_body() {
        let body = serde_json::to_value(Liveness::ok()).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], VERSION);
    }

    #[tokio::test]
    async fn test_readiness_takes_worst_status() {
        let checker = HealthChecker::new();
        assert_eq!(checker.readiness().await.status, HealthStatus::Healthy);

        checker.register_subsystem("sampler").await;
        checker.register_subsystem("storage").await;
        assert_eq!(checker.readiness().await.subsystems.len(), 2);

        checker
            .update_subsystem("storage", HealthStatus::Degraded, Some("disk full".to_string()))
            .await;
        let report = checker.readiness().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.subsystems["storage"].message.as_deref(), Some("disk full"));

        checker.update_subsystem("sampler", HealthStatus::Unhealthy, None).await;
        assert_eq!(checker.readiness().await.status, HealthStatus::Unhealthy);

        checker.update_subsystem("storage", HealthStatus::Healthy, None).await;
        checker.update_subsystem("sampler", HealthStatus::Healthy, None).await;
        assert_eq!(checker.readiness().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_unregistered_updates_ignored() {
        let checker = HealthChecker::new();
        checker.update_subsystem("ghost", HealthStatus::Unhealthy, None).await;
        let report = checker.readiness().await;
        assert!(report.subsystems.is_empty());
        assert_eq!(report.status, HealthStatus::Healthy);
    }
}
