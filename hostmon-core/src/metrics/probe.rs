//! Host probe abstraction and the `sysinfo`-backed implementation.

use super::types::{percent_of, CounterReading, DiskStats, MemoryStats, SystemSummary};
use crate::error::{HostmonError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime};
use sysinfo::{Disks, Networks, System};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Shortest CPU measurement window that still yields a meaningful reading.
const MIN_CPU_WINDOW: Duration = Duration::from_millis(200);

/// Point-in-time readings of operating-system counters.
///
/// Every call may fail on its own with [`HostmonError::ProbeUnavailable`].
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Global CPU utilization (0-100), measured over the probe's window.
    ///
    /// This is the only call expected to block for a noticeable time.
    async fn cpu_percent(&self) -> Result<f64>;

    async fn memory(&self) -> Result<MemoryStats>;

    /// Usage of the filesystem mounted at `mount_point`.
    async fn disk_usage(&self, mount_point: &str) -> Result<DiskStats>;

    /// Cumulative counters for every interface, stamped with one instant.
    async fn network_counters(&self) -> Result<Vec<CounterReading>>;

    /// Static host facts; `mount_point` selects the disk reported as total disk.
    async fn summary(&self, mount_point: &str) -> Result<SystemSummary>;

    /// Probe name (for logging).
    fn name(&self) -> &str;
}

struct ProbeState {
    system: System,
    disks: Disks,
    networks: Networks,
}

/// Probe backed by the `sysinfo` crate.
pub struct SysinfoProbe {
    state: Mutex<ProbeState>,
    cpu_window: Duration,
}

impl SysinfoProbe {
    pub fn new(cpu_window: Duration) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            state: Mutex::new(ProbeState {
                system,
                disks: Disks::new_with_refreshed_list(),
                networks: Networks::new_with_refreshed_list(),
            }),
            cpu_window: cpu_window.max(MIN_CPU_WINDOW),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl SystemProbe for SysinfoProbe {
    #[instrument(skip(self))]
    async fn cpu_percent(&self) -> Result<f64> {
        // Held across the window so concurrent callers cannot shorten each other's measurement.
        let mut state = self.state.lock().await;
        state.system.refresh_cpu_usage();
        tokio::time::sleep(self.cpu_window).await;
        state.system.refresh_cpu_usage();

        if state.system.cpus().is_empty() {
            return Err(HostmonError::ProbeUnavailable {
                probe: "cpu",
                reason: "no CPUs reported".to_string(),
            });
        }

        let usage = state.system.global_cpu_info().cpu_usage() as f64;
        if !usage.is_finite() {
            return Err(HostmonError::ProbeUnavailable {
                probe: "cpu",
                reason: format!("non-finite usage {}", usage),
            });
        }
        Ok(usage.clamp(0.0, 100.0))
    }

    async fn memory(&self) -> Result<MemoryStats> {
        let mut state = self.state.lock().await;
        state.system.refresh_memory();

        let total = state.system.total_memory();
        if total == 0 {
            return Err(HostmonError::ProbeUnavailable {
                probe: "memory",
                reason: "total memory reported as 0".to_string(),
            });
        }
        let used = state.system.used_memory();
        Ok(MemoryStats { total, used, percent: percent_of(used, total) })
    }

    async fn disk_usage(&self, mount_point: &str) -> Result<DiskStats> {
        let mut state = self.state.lock().await;
        state.disks.refresh_list();

        let disk = state
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new(mount_point))
            .ok_or_else(|| HostmonError::ProbeUnavailable {
                probe: "disk",
                reason: format!("no filesystem mounted at {}", mount_point),
            })?;

        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        Ok(DiskStats { path: mount_point.to_string(), total, used, percent: percent_of(used, total) })
    }

    async fn network_counters(&self) -> Result<Vec<CounterReading>> {
        let mut state = self.state.lock().await;
        state.networks.refresh_list();
        let taken_at = SystemTime::now();
        let drops = read_interface_drops();

        let readings = state
            .networks
            .iter()
            .map(|(name, data)| {
                let (drops_in, drops_out) = drops.get(name.as_str()).copied().unwrap_or((0, 0));
                CounterReading {
                    interface: name.clone(),
                    bytes_sent: data.total_transmitted(),
                    bytes_received: data.total_received(),
                    packets_sent: data.total_packets_transmitted(),
                    packets_received: data.total_packets_received(),
                    errors_in: data.total_errors_on_received(),
                    errors_out: data.total_errors_on_transmitted(),
                    drops_in,
                    drops_out,
                    taken_at,
                }
            })
            .collect::<Vec<_>>();

        debug!(interfaces = readings.len(), "Read network counters");
        Ok(readings)
    }

    async fn summary(&self, mount_point: &str) -> Result<SystemSummary> {
        let mut state = self.state.lock().await;
        state.system.refresh_cpu();
        state.system.refresh_memory();
        state.disks.refresh_list();

        let (cpu_vendor, cpu_brand) = state
            .system
            .cpus()
            .first()
            .map(|cpu| (cpu.vendor_id().trim().to_string(), cpu.brand().trim().to_string()))
            .unwrap_or_default();

        let total_disk = state
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new(mount_point))
            .map(|d| d.total_space())
            .unwrap_or(0);

        Ok(SystemSummary {
            vcpu_count: state.system.cpus().len(),
            physical_cores: state.system.physical_core_count(),
            cpu_vendor,
            cpu_brand,
            total_memory: state.system.total_memory(),
            total_disk,
            hostname: System::host_name(),
            os_name: System::name(),
            os_version: System::os_version(),
            kernel_version: System::kernel_version(),
        })
    }

    fn name(&self) -> &str {
        "sysinfo"
    }
}

/// Interface drop counters, which `sysinfo` does not expose.
#[cfg(target_os = "linux")]
fn read_interface_drops() -> HashMap<String, (u64, u64)> {
    match std::fs::read_to_string("/proc/net/dev") {
        Ok(content) => parse_proc_net_dev_drops(&content),
        Err(e) => {
            debug!(error = %e, "Could not read /proc/net/dev, reporting zero drops");
            HashMap::new()
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_interface_drops() -> HashMap<String, (u64, u64)> {
    HashMap::new()
}

/// Parse `(drops_in, drops_out)` per interface from `/proc/net/dev` content.
pub(crate) fn parse_proc_net_dev_drops(content: &str) -> HashMap<String, (u64, u64)> {
    content
        .lines()
        .filter_map(|line| {
            let (name, stats) = line.split_once(':')?;
            let fields: Vec<u64> =
                stats.split_whitespace().map(|f| f.parse().ok()).collect::<Option<_>>()?;
            // Receive: bytes packets errs drop ...; transmit starts at column 8.
            if fields.len() < 12 {
                return None;
            }
            Some((name.trim().to_string(), (fields[3], fields[11])))
        })
        .collect()
}
