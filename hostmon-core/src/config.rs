//! Configuration management.
//!
//! Values resolve in three layers: built-in defaults, an optional JSON file,
//! then environment variables.

use crate::duration::{self, serde_go};
use crate::error::{HostmonError, Result};
use crate::metrics::BackpressurePolicy;
use crate::{paths, ports};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for a remote InfluxDB v2 instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// Which storage backend the daemon persists snapshots to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite { path: PathBuf },
    Influx(InfluxConfig),
}

/// Runtime configuration for hostmon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: String,
    /// Explicit database file; defaults to `<data_dir>/metrics.db`.
    pub db_path: Option<String>,
    pub influx: Option<InfluxConfig>,
    #[serde(with = "serde_go")]
    pub retention: Duration,
    #[serde(with = "serde_go")]
    pub collect_interval: Duration,
    #[serde(with = "serde_go")]
    pub cleanup_interval: Duration,
    #[serde(with = "serde_go")]
    pub cpu_sample_window: Duration,
    pub mount_point: String,
    pub listen_port: u16,
    pub queue_capacity: usize,
    pub backpressure: BackpressurePolicy,
    pub log_level: String,
    pub prometheus_enabled: bool,
    pub prometheus_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: paths::data_dir().to_string_lossy().to_string(),
            db_path: None,
            influx: None,
            retention: Duration::from_secs(60 * 24 * 60 * 60), // 60 days
            collect_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(3600),
            cpu_sample_window: Duration::from_secs(1),
            mount_point: "/".to_string(),
            listen_port: ports::PORT_HTTP,
            queue_capacity: 64,
            backpressure: BackpressurePolicy::DropOldest,
            log_level: "info".to_string(),
            prometheus_enabled: false,
            prometheus_port: ports::PORT_PROMETHEUS,
        }
    }
}

impl Config {
    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        std::env::var("HOSTMON_CONFIG").map(PathBuf::from).unwrap_or_else(|_| paths::config_path())
    }

    /// Load configuration from the config file (if any) and the process environment.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() { Self::from_file(&path)? } else { Self::default() };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file, without consulting the environment.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HostmonError::InvalidConfig {
            reason: format!("Failed to read config {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| HostmonError::InvalidConfig {
            reason: format!("Failed to parse config: {}", e),
        })
    }

    /// Overlay environment variables obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = get("HOSTMON_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Some(path) = get("HOSTMON_DB_PATH") {
            self.db_path = Some(path);
        }

        let influx_url = get("INFLUXDB_URL");
        let influx_token = get("INFLUXDB_TOKEN");
        let influx_org = get("INFLUXDB_ORG");
        let influx_bucket = get("INFLUXDB_BUCKET");
        match (influx_url, influx_token, influx_org, influx_bucket) {
            (Some(url), Some(token), Some(org), Some(bucket)) => {
                self.influx = Some(InfluxConfig { url, token, org, bucket });
            }
            (None, None, None, None) => {}
            (None, ..) => {
                return Err(HostmonError::InvalidConfig {
                    reason: "INFLUXDB_TOKEN/ORG/BUCKET set without INFLUXDB_URL".to_string(),
                });
            }
            _ => {
                return Err(HostmonError::InvalidConfig {
                    reason: "INFLUXDB_URL requires INFLUXDB_TOKEN, INFLUXDB_ORG and INFLUXDB_BUCKET"
                        .to_string(),
                });
            }
        }

        if let Some(value) = get("HOSTMON_RETENTION") {
            self.retention = duration::parse_duration(&value)?;
        }
        if let Some(value) = get("HOSTMON_COLLECT_INTERVAL") {
            self.collect_interval = duration::parse_duration(&value)?;
        }
        if let Some(value) = get("HOSTMON_CLEANUP_INTERVAL") {
            self.cleanup_interval = duration::parse_duration(&value)?;
        }
        if let Some(value) = get("HOSTMON_MOUNT_POINT") {
            self.mount_point = value;
        }
        if let Some(value) = get("HOSTMON_PORT").or_else(|| get("PORT")) {
            self.listen_port = parse_number("HOSTMON_PORT", &value)?;
        }
        if let Some(value) = get("HOSTMON_QUEUE_CAPACITY") {
            self.queue_capacity = parse_number("HOSTMON_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = get("HOSTMON_BACKPRESSURE") {
            self.backpressure = value.parse()?;
        }
        if let Some(value) = get("HOSTMON_LOG_LEVEL") {
            self.log_level = value;
        }
        if get("HOSTMON_PROMETHEUS_ENABLED").is_some() {
            self.prometheus_enabled = true;
        }
        if let Some(value) = get("HOSTMON_PROMETHEUS_PORT") {
            self.prometheus_port = parse_number("HOSTMON_PROMETHEUS_PORT", &value)?;
        }

        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.is_some() && self.influx.is_some() {
            return Err(HostmonError::InvalidConfig {
                reason: "a database path and an InfluxDB URL are mutually exclusive".to_string(),
            });
        }
        if self.collect_interval.is_zero() {
            return Err(HostmonError::InvalidConfig {
                reason: "collect interval must be positive".to_string(),
            });
        }
        if self.cleanup_interval.is_zero() {
            return Err(HostmonError::InvalidConfig {
                reason: "cleanup interval must be positive".to_string(),
            });
        }
        if self.retention.is_zero() {
            return Err(HostmonError::InvalidConfig {
                reason: "retention window must be positive".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(HostmonError::InvalidConfig {
                reason: "queue capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the storage backend selected by this configuration.
    pub fn backend(&self) -> StorageBackend {
        match &self.influx {
            Some(influx) => StorageBackend::Influx(influx.clone()),
            None => StorageBackend::Sqlite {
                path: self
                    .db_path
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(&self.data_dir).join(paths::DB_FILE_NAME)),
            },
        }
    }

    /// Save configuration to disk.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HostmonError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| HostmonError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content)
            .map_err(|e| HostmonError::IoError { path: path.to_path_buf(), source: e })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| HostmonError::InvalidConfig {
        reason: format!("{} must be a number, got '{}'", key, value),
    })
}
