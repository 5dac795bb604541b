//! Centralized path configuration for hostmon.
//!
//! All data paths go through this module so the daemon resolves the same
//! locations whether it runs as a user process or a system service.

use std::path::PathBuf;

/// Get the hostmon data directory.
///
/// Resolution order:
/// 1. `HOSTMON_DATA_DIR` environment variable
/// 2. `/var/lib/hostmon` if it exists (system install)
/// 3. `~/.hostmon` for user-only installs
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HOSTMON_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/var/lib/hostmon");
    if system_dir.exists() {
        return system_dir;
    }

    dirs::home_dir().map(|h| h.join(".hostmon")).unwrap_or(system_dir)
}

/// Database file name inside a data directory.
pub const DB_FILE_NAME: &str = "metrics.db";

/// Get the config file path.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("hostmon"))
        .unwrap_or_else(data_dir)
        .join("config.json")
}
