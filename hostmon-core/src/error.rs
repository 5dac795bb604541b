//! Error types for hostmon.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hostmon operations.
pub type Result<T> = std::result::Result<T, HostmonError>;

/// Main error type for hostmon.
#[derive(Error, Debug)]
pub enum HostmonError {
    // Probe and collection errors
    #[error("System probe '{probe}' unavailable: {reason}")]
    ProbeUnavailable { probe: &'static str, reason: String },

    #[error("Collection failed: {source}")]
    CollectionFailed {
        #[source]
        source: Box<HostmonError>,
    },

    #[error("Invalid interval of {elapsed_secs}s for interface {interface}")]
    InvalidInterval { interface: String, elapsed_secs: f64 },

    // Storage errors
    #[error("Failed to write snapshot to {backend}: {reason}")]
    WriteFailed { backend: &'static str, reason: String },

    #[error("Retention cleanup failed on {backend}: {reason}")]
    CleanupFailed { backend: &'static str, reason: String },

    #[error("History query failed on {backend}: {reason}")]
    QueryFailed { backend: &'static str, reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HostmonError {
    /// Wrap a probe failure as an aborted collection.
    pub fn collection(source: HostmonError) -> Self {
        Self::CollectionFailed { source: Box::new(source) }
    }

    /// Whether this error came from reading system state (as opposed to storage).
    pub fn is_probe_failure(&self) -> bool {
        match self {
            Self::ProbeUnavailable { .. } => true,
            Self::CollectionFailed { source } => source.is_probe_failure(),
            _ => false,
        }
    }
}
