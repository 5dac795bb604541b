//! Scriptable probe for tests and local development.

use super::probe::SystemProbe;
use super::types::{percent_of, CounterReading, DiskStats, MemoryStats, SystemSummary};
use crate::error::{HostmonError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct FakeReadings {
    cpu_percent: f64,
    memory: MemoryStats,
    disk: DiskStats,
    interfaces: BTreeMap<String, CounterReading>,
    clock: SystemTime,
    failing: Option<&'static str>,
    cpu_delay: Duration,
}

/// Probe whose readings are set by the test.
///
/// Network readings are stamped with a manual clock so rate tests are exact.
pub struct FakeProbe {
    readings: Mutex<FakeReadings>,
    cpu_calls: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        let total = 16 * 1024 * 1024 * 1024;
        Self {
            readings: Mutex::new(FakeReadings {
                cpu_percent: 0.0,
                memory: MemoryStats { total, used: total / 4, percent: 25.0 },
                disk: DiskStats {
                    path: "/".to_string(),
                    total: 512 * 1024 * 1024 * 1024,
                    used: 128 * 1024 * 1024 * 1024,
                    percent: 25.0,
                },
                interfaces: BTreeMap::new(),
                clock: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
                failing: None,
                cpu_delay: Duration::ZERO,
            }),
            cpu_calls: AtomicUsize::new(0),
        }
    }

    fn with_readings<T>(&self, f: impl FnOnce(&mut FakeReadings) -> T) -> T {
        let mut readings = self.readings.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut readings)
    }

    pub fn set_cpu(&self, percent: f64) {
        self.with_readings(|r| r.cpu_percent = percent);
    }

    pub fn set_memory(&self, total: u64, used: u64) {
        self.with_readings(|r| {
            r.memory = MemoryStats { total, used, percent: percent_of(used, total) }
        });
    }

    pub fn set_disk(&self, total: u64, used: u64) {
        self.with_readings(|r| {
            r.disk.total = total;
            r.disk.used = used;
            r.disk.percent = percent_of(used, total);
        });
    }

    /// Set the cumulative bytes sent/received for an interface, adding it if new.
    pub fn set_interface_bytes(&self, interface: &str, bytes_sent: u64, bytes_received: u64) {
        self.with_readings(|r| {
            let clock = r.clock;
            let reading = r
                .interfaces
                .entry(interface.to_string())
                .or_insert_with(|| CounterReading::zeroed(interface, clock));
            reading.bytes_sent = bytes_sent;
            reading.bytes_received = bytes_received;
        });
    }

    /// Replace every counter of an interface.
    pub fn set_interface(&self, reading: CounterReading) {
        self.with_readings(|r| {
            r.interfaces.insert(reading.interface.clone(), reading);
        });
    }

    pub fn remove_interface(&self, interface: &str) {
        self.with_readings(|r| {
            r.interfaces.remove(interface);
        });
    }

    /// Move the probe clock forward (negative steps are not representable; see `set_clock`).
    pub fn advance(&self, by: Duration) {
        self.with_readings(|r| r.clock += by);
    }

    pub fn set_clock(&self, at: SystemTime) {
        self.with_readings(|r| r.clock = at);
    }

    pub fn now(&self) -> SystemTime {
        self.with_readings(|r| r.clock)
    }

    /// Make the named probe call ("cpu", "memory", "disk", "network") fail.
    pub fn fail(&self, probe: Option<&'static str>) {
        self.with_readings(|r| r.failing = probe);
    }

    /// Delay every CPU read, imitating the real measurement window.
    pub fn set_cpu_delay(&self, delay: Duration) {
        self.with_readings(|r| r.cpu_delay = delay);
    }

    pub fn cpu_calls(&self) -> usize {
        self.cpu_calls.load(Ordering::SeqCst)
    }

    fn check(&self, probe: &'static str) -> Result<()> {
        if self.with_readings(|r| r.failing) == Some(probe) {
            return Err(HostmonError::ProbeUnavailable {
                probe,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for FakeProbe {
    async fn cpu_percent(&self) -> Result<f64> {
        self.cpu_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.with_readings(|r| r.cpu_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check("cpu")?;
        Ok(self.with_readings(|r| r.cpu_percent))
    }

    async fn memory(&self) -> Result<MemoryStats> {
        self.check("memory")?;
        Ok(self.with_readings(|r| r.memory.clone()))
    }

    async fn disk_usage(&self, mount_point: &str) -> Result<DiskStats> {
        self.check("disk")?;
        let mut disk = self.with_readings(|r| r.disk.clone());
        disk.path = mount_point.to_string();
        Ok(disk)
    }

    async fn network_counters(&self) -> Result<Vec<CounterReading>> {
        self.check("network")?;
        Ok(self.with_readings(|r| {
            r.interfaces
                .values()
                .map(|reading| CounterReading { taken_at: r.clock, ..reading.clone() })
                .collect()
        }))
    }

    async fn summary(&self, _mount_point: &str) -> Result<SystemSummary> {
        self.check("summary")?;
        Ok(self.with_readings(|r| SystemSummary {
            vcpu_count: 4,
            physical_cores: Some(2),
            cpu_vendor: "GenuineFake".to_string(),
            cpu_brand: "Fake CPU @ 1.00GHz".to_string(),
            total_memory: r.memory.total,
            total_disk: r.disk.total,
            hostname: Some("fakehost".to_string()),
            os_name: Some("FakeOS".to_string()),
            os_version: Some("1.0".to_string()),
            kernel_version: None,
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}
