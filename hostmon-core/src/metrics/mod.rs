//! Host metrics sampling, rate derivation and history.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  collect()   ┌──────────────┐   probe    ┌──────────────┐
//! │  Scheduler   │ ───────────► │   Sampler    │ ─────────► │ SystemProbe  │
//! │  (interval)  │              │  baseline    │            │  (sysinfo)   │
//! └──────┬───────┘              │  rate engine │            └──────────────┘
//!        │                      └──────┬───────┘
//!        │ push()                      │ Snapshot
//!        │                             ▼
//!        │                      ┌──────────────┐   write    ┌──────────────┐
//!        └────────────────────► │ SnapshotQueue│ ─────────► │ StorageSink  │
//!                               │  (bounded)   │   writer   │ SQLite/Influx│
//!                               └──────────────┘            └──────┬───────┘
//!                                                                  │ rows
//!                                                                  ▼
//!                                                           reconstruct()
//! ```
//!
//! Retention cleanup goes straight from the scheduler to the sink.
//! HTTP requests for current metrics call the same [`Sampler`] as the
//! scheduler, so there is a single baseline per process.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
mod history;
mod probe;
mod queue;
mod rate;
mod sampler;
mod scheduler;
mod types;

pub use history::{reconstruct, Resolution};
pub use probe::{SysinfoProbe, SystemProbe};
pub use queue::{run_writer, BackpressurePolicy, PushOutcome, SnapshotQueue};
pub use rate::{compute_rate, elapsed_between, RateError, RateOutcome};
pub use sampler::{Sampler, SamplerState};
pub use scheduler::{ScheduleConfig, Scheduler};
pub use types::{
    percent_of, unix_seconds, CounterReading, DiskStats, HistoricalSeries, MemoryStats,
    RateSample, Snapshot, StoredInterfaceRow, StoredMetricRow, SystemSummary, TimeSeriesPoint,
};
