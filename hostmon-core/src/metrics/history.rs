//! Historical series reconstruction from stored rows.

use super::types::{HistoricalSeries, StoredMetricRow, TimeSeriesPoint};
use crate::error::{HostmonError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolution for series aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// No aggregation, one point per stored row.
    #[default]
    Raw,
    /// 1-minute aggregation buckets
    Minute,
    /// 1-hour aggregation buckets
    Hour,
    /// 1-day aggregation buckets
    Day,
}

impl Resolution {
    /// Get the bucket size in seconds.
    pub fn bucket_seconds(&self) -> i64 {
        match self {
            Self::Raw => 1,
            Self::Minute => 60,
            Self::Hour => 3600,
            Self::Day => 86400,
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = HostmonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            other => Err(HostmonError::InvalidConfig {
                reason: format!("unknown resolution '{}'", other),
            }),
        }
    }
}

/// Build ascending CPU, memory and disk series from stored rows.
///
/// Rows may arrive in any order (storage returns newest first); the output is
/// always sorted by increasing timestamp, and rows sharing a timestamp keep
/// their delivery order.
pub fn reconstruct(rows: &[StoredMetricRow]) -> HistoricalSeries {
    let mut ordered: Vec<&StoredMetricRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.timestamp);

    let point = |timestamp, value| TimeSeriesPoint { timestamp, value };
    HistoricalSeries {
        cpu: ordered.iter().map(|r| point(r.timestamp, r.cpu_percent)).collect(),
        memory: ordered.iter().map(|r| point(r.timestamp, r.memory_percent)).collect(),
        disk: ordered.iter().map(|r| point(r.timestamp, r.disk_percent)).collect(),
    }
}

impl HistoricalSeries {
    /// Average each series into fixed-width buckets keyed by bucket start.
    pub fn downsample(&self, resolution: Resolution) -> HistoricalSeries {
        if resolution == Resolution::Raw {
            return self.clone();
        }
        let bucket = resolution.bucket_seconds();
        HistoricalSeries {
            cpu: average_buckets(&self.cpu, bucket),
            memory: average_buckets(&self.memory, bucket),
            disk: average_buckets(&self.disk, bucket),
        }
    }
}

fn average_buckets(points: &[TimeSeriesPoint], bucket: i64) -> Vec<TimeSeriesPoint> {
    let mut buckets: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
    for p in points {
        let start = p.timestamp.div_euclid(bucket) * bucket;
        let entry = buckets.entry(start).or_insert((0.0, 0));
        entry.0 += p.value;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(timestamp, (sum, count))| TimeSeriesPoint { timestamp, value: sum / count as f64 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(timestamp: i64, cpu: f64, memory: f64, disk: f64) -> StoredMetricRow {
        StoredMetricRow {
            id: None,
            timestamp,
            cpu_percent: cpu,
            memory_percent: memory,
            memory_total: 100,
            memory_used: memory as u64,
            disk_percent: disk,
            disk_total: 100,
            disk_used: disk as u64,
            interfaces: Vec::new(),
        }
    }

    #[test]
    fn test_reconstruct_empty() {
        let series = reconstruct(&[]);
        assert!(series.is_empty());
        assert!(series.cpu.is_empty() && series.memory.is_empty() && series.disk.is_empty());
    }

    #[test]
    fn test_reconstruct_reverses_descending_rows() {
        let rows = vec![row(300, 3.0, 30.0, 33.0), row(200, 2.0, 20.0, 22.0), row(100, 1.0, 10.0, 11.0)];
        let series = reconstruct(&rows);

        let timestamps: Vec<i64> = series.cpu.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
        assert_eq!(series.cpu[0].value, 1.0);
        assert_eq!(series.memory[1].value, 20.0);
        assert_eq!(series.disk[2].value, 33.0);
    }

    #[test]
    fn test_reconstruct_keeps_tie_order() {
        let rows = vec![row(100, 1.0, 0.0, 0.0), row(100, 2.0, 0.0, 0.0)];
        let series = reconstruct(&rows);
        assert_eq!(series.cpu[0].value, 1.0);
        assert_eq!(series.cpu[1].value, 2.0);
    }

    #[test]
    fn test_downsample_minute_buckets() {
        let rows = vec![
            row(60, 10.0, 50.0, 5.0),
            row(90, 20.0, 60.0, 5.0),
            row(120, 40.0, 70.0, 5.0),
        ];
        let series = reconstruct(&rows).downsample(Resolution::Minute);

        assert_eq!(series.cpu.len(), 2);
        assert_eq!(series.cpu[0], TimeSeriesPoint { timestamp: 60, value: 15.0 });
        assert_eq!(series.cpu[1], TimeSeriesPoint { timestamp: 120, value: 40.0 });
        assert_eq!(series.memory[0].value, 55.0);
    }

    #[test]
    fn test_downsample_raw_is_identity() {
        let series = reconstruct(&[row(1, 1.0, 1.0, 1.0), row(2, 2.0, 2.0, 2.0)]);
        assert_eq!(series.downsample(Resolution::Raw), series);
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!("raw".parse::<Resolution>().unwrap(), Resolution::Raw);
        assert_eq!("Hour".parse::<Resolution>().unwrap(), Resolution::Hour);
        assert_eq!(Resolution::Day.bucket_seconds(), 86400);
        assert!("weekly".parse::<Resolution>().is_err());
    }
}
