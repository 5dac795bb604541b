//! Default network ports used by hostmon.

/// HTTP API (`/metrics`, `/metrics/history`, `/health`, `/summary`).
pub const PORT_HTTP: u16 = 8080;

/// Prometheus exposition endpoint, enabled with `HOSTMON_PROMETHEUS_ENABLED`.
pub const PORT_PROMETHEUS: u16 = 9464;
