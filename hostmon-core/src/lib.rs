//! hostmon core library
//!
//! Host probes, rate derivation, the shared sampler and the storage sinks used
//! by the hostmon metrics agent.

pub mod config;
pub mod duration;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod paths;
pub mod ports;
pub mod state;
pub mod storage;

// Re-export commonly used items
pub use config::{Config, InfluxConfig, StorageBackend};
pub use error::{HostmonError, Result};
pub use observability::{
    health::HealthChecker, init as init_observability, shutdown as shutdown_observability,
    ObservabilityOptions,
};
pub use state::StateManager;
pub use storage::{open_sink, StorageSink};
