//! One collection cycle: probe, derive rates, advance the baseline.

use super::probe::SystemProbe;
use super::rate::{compute_rate, elapsed_between, RateError, RateOutcome};
use super::types::{unix_seconds, CounterReading, Snapshot, SystemSummary};
use crate::error::{HostmonError, Result};
use crate::observability::metrics as obs;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Previous readings used as the left-hand side of rate computations.
#[derive(Debug, Clone, Default)]
pub struct SamplerState {
    pub baseline: BTreeMap<String, CounterReading>,
    pub last_collection: Option<SystemTime>,
}

/// Collects snapshots from a [`SystemProbe`].
///
/// All collections, whether from the scheduler or an HTTP request, go through
/// the same instance and therefore share one baseline. A collection holds the
/// state lock for its whole read-modify-write cycle, so concurrent callers
/// queue instead of interleaving.
pub struct Sampler {
    probe: Arc<dyn SystemProbe>,
    mount_point: String,
    max_baseline_age: Option<Duration>,
    state: Mutex<SamplerState>,
}

impl Sampler {
    pub fn new(probe: Arc<dyn SystemProbe>, mount_point: impl Into<String>) -> Self {
        Self {
            probe,
            mount_point: mount_point.into(),
            max_baseline_age: None,
            state: Mutex::new(SamplerState::default()),
        }
    }

    /// Ignore baselines older than `age`; the interface then reports no rate
    /// for that cycle. Daemons pass the retention window.
    pub fn with_max_baseline_age(mut self, age: Duration) -> Self {
        self.max_baseline_age = Some(age);
        self
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Run one full collection cycle.
    ///
    /// On probe failure nothing is written to the baseline, so the next
    /// successful cycle still diffs against the last good readings.
    #[instrument(skip(self), fields(probe = self.probe.name()))]
    pub async fn collect(&self) -> Result<Snapshot> {
        let started = Instant::now();
        let mut state = self.state.lock().await;

        let cpu_percent = self.probe.cpu_percent().await.map_err(|e| self.abort(e))?;
        let memory = self.probe.memory().await.map_err(|e| self.abort(e))?;
        let disk = self.probe.disk_usage(&self.mount_point).await.map_err(|e| self.abort(e))?;
        let readings = self.probe.network_counters().await.map_err(|e| self.abort(e))?;

        let mut rates = BTreeMap::new();
        for reading in &readings {
            let mut previous = state.baseline.get(&reading.interface);
            let elapsed =
                previous.map(|p| elapsed_between(p.taken_at, reading.taken_at)).unwrap_or_default();
            if let Some(max_age) = self.max_baseline_age {
                if previous.is_some() && elapsed > max_age.as_secs_f64() {
                    debug!(interface = %reading.interface, elapsed_secs = elapsed, "Baseline older than retention, discarded");
                    previous = None;
                }
            }

            match compute_rate(reading, previous, elapsed) {
                Ok(RateOutcome::Rate(sample)) => {
                    if sample.counter_reset {
                        debug!(interface = %reading.interface, "Counter went backwards, rate clamped to zero");
                        obs::record_counter_reset(&reading.interface);
                    }
                    rates.insert(reading.interface.clone(), sample);
                }
                Ok(RateOutcome::NoBaseline) => {
                    debug!(interface = %reading.interface, "No baseline for interface yet");
                }
                Err(RateError::InvalidInterval { elapsed_secs }) => {
                    let err = HostmonError::InvalidInterval {
                        interface: reading.interface.clone(),
                        elapsed_secs,
                    };
                    warn!(error = %err, "Skipping rate for interface");
                }
            }
        }

        let network: BTreeMap<String, CounterReading> =
            readings.into_iter().map(|r| (r.interface.clone(), r)).collect();

        let now = SystemTime::now();
        state.baseline = network.clone();
        state.last_collection = Some(now);
        drop(state);

        obs::record_collection(started.elapsed().as_secs_f64());

        Ok(Snapshot {
            timestamp: unix_seconds(now),
            cpu_percent,
            memory,
            disk,
            network,
            rates,
        })
    }

    fn abort(&self, err: HostmonError) -> HostmonError {
        if let HostmonError::ProbeUnavailable { probe, .. } = &err {
            obs::record_collection_failure(probe);
        }
        HostmonError::collection(err)
    }

    /// Copy of the current baseline state.
    pub async fn state(&self) -> SamplerState {
        self.state.lock().await.clone()
    }

    /// Copy of the per-interface baseline only.
    pub async fn baseline(&self) -> BTreeMap<String, CounterReading> {
        self.state.lock().await.baseline.clone()
    }

    /// Static host facts; does not touch the baseline.
    pub async fn summary(&self) -> Result<SystemSummary> {
        self.probe.summary(&self.mount_point).await
    }
}
