//! Data model shared by the sampler, storage sinks and the HTTP layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Cumulative counters for one network interface at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterReading {
    pub interface: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub errors_in: u64,
    pub errors_out: u64,
    pub drops_in: u64,
    pub drops_out: u64,
    /// Wall-clock instant the counters were read.
    #[serde(with = "unix_millis")]
    pub taken_at: SystemTime,
}

impl CounterReading {
    /// A reading with all counters at zero.
    pub fn zeroed(interface: impl Into<String>, taken_at: SystemTime) -> Self {
        Self {
            interface: interface.into(),
            bytes_sent: 0,
            bytes_received: 0,
            packets_sent: 0,
            packets_received: 0,
            errors_in: 0,
            errors_out: 0,
            drops_in: 0,
            drops_out: 0,
            taken_at,
        }
    }
}

/// Per-second rates derived from two consecutive readings of one interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub bytes_sent_per_sec: f64,
    pub bytes_received_per_sec: f64,
    pub packets_sent_per_sec: f64,
    pub packets_received_per_sec: f64,
    pub errors_in_per_sec: f64,
    pub errors_out_per_sec: f64,
    /// Seconds between the two readings.
    pub elapsed_secs: f64,
    /// At least one counter went backwards and its rate was clamped to zero.
    pub counter_reset: bool,
}

/// Memory usage in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

/// Usage of the filesystem mounted at `path`, in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub path: String,
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

/// One complete collection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    /// CPU utilization (0-100) over the probe's measurement window.
    pub cpu_percent: f64,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: BTreeMap<String, CounterReading>,
    /// Present only for interfaces that had a baseline.
    pub rates: BTreeMap<String, RateSample>,
}

/// Per-interface counters as persisted next to a [`StoredMetricRow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredInterfaceRow {
    pub interface: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub errors_in: u64,
    pub errors_out: u64,
    pub drops_in: u64,
    pub drops_out: u64,
}

impl From<&CounterReading> for StoredInterfaceRow {
    fn from(reading: &CounterReading) -> Self {
        Self {
            interface: reading.interface.clone(),
            bytes_sent: reading.bytes_sent,
            bytes_received: reading.bytes_received,
            packets_sent: reading.packets_sent,
            packets_received: reading.packets_received,
            errors_in: reading.errors_in,
            errors_out: reading.errors_out,
            drops_in: reading.drops_in,
            drops_out: reading.drops_out,
        }
    }
}

/// A snapshot as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetricRow {
    /// Backend-assigned row id, when the backend has one.
    pub id: Option<i64>,
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub disk_percent: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub interfaces: Vec<StoredInterfaceRow>,
}

impl From<&Snapshot> for StoredMetricRow {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: None,
            timestamp: snapshot.timestamp,
            cpu_percent: snapshot.cpu_percent,
            memory_percent: snapshot.memory.percent,
            memory_total: snapshot.memory.total,
            memory_used: snapshot.memory.used,
            disk_percent: snapshot.disk.percent,
            disk_total: snapshot.disk.total,
            disk_used: snapshot.disk.used,
            interfaces: snapshot.network.values().map(StoredInterfaceRow::from).collect(),
        }
    }
}

/// A single (timestamp, value) point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// CPU, memory and disk utilization series, each in ascending timestamp order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub cpu: Vec<TimeSeriesPoint>,
    pub memory: Vec<TimeSeriesPoint>,
    pub disk: Vec<TimeSeriesPoint>,
}

impl HistoricalSeries {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty() && self.memory.is_empty() && self.disk.is_empty()
    }
}

/// Static facts about the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub vcpu_count: usize,
    pub physical_cores: Option<usize>,
    pub cpu_vendor: String,
    pub cpu_brand: String,
    pub total_memory: u64,
    pub total_disk: u64,
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
}

/// Percentage of `used` in `total`, 0 when `total` is 0.
pub fn percent_of(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

/// Seconds since the Unix epoch for `time` (0 for pre-epoch instants).
pub fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

mod unix_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(value: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = value.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 0), 0.0);
        assert_eq!(percent_of(25, 100), 25.0);
        assert_eq!(percent_of(100, 100), 100.0);
    }

    #[test]
    fn test_stored_row_from_snapshot() {
        let taken_at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut eth0 = CounterReading::zeroed("eth0", taken_at);
        eth0.bytes_sent = 1000;
        eth0.drops_in = 3;

        let snapshot = Snapshot {
            timestamp: 1_700_000_000,
            cpu_percent: 12.3,
            memory: MemoryStats { total: 8, used: 4, percent: 50.0 },
            disk: DiskStats { path: "/".into(), total: 100, used: 25, percent: 25.0 },
            network: BTreeMap::from([("eth0".to_string(), eth0)]),
            rates: BTreeMap::new(),
        };

        let row = StoredMetricRow::from(&snapshot);
        assert_eq!(row.timestamp, 1_700_000_000);
        assert_eq!(row.memory_percent, 50.0);
        assert_eq!(row.disk_used, 25);
        assert_eq!(row.interfaces.len(), 1);
        assert_eq!(row.interfaces[0].bytes_sent, 1000);
        assert_eq!(row.interfaces[0].drops_in, 3);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let taken_at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_500);
        let snapshot = Snapshot {
            timestamp: 1_700_000_000,
            cpu_percent: 1.0,
            memory: MemoryStats { total: 2, used: 1, percent: 50.0 },
            disk: DiskStats { path: "/".into(), total: 2, used: 1, percent: 50.0 },
            network: BTreeMap::from([("lo".to_string(), CounterReading::zeroed("lo", taken_at))]),
            rates: BTreeMap::new(),
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["network"]["lo"]["taken_at"], 1_700_000_000_500u64);
        assert!(value["rates"].as_object().unwrap().is_empty());

        let back: Snapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }
}
