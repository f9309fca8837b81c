mod config;
pub mod database;
mod memory;
pub mod migrations;
mod store;

pub use config::{Config, LoggingConfig, NotificationsConfig, ProgressConfig, TimerConfig};
pub use database::Database;
pub use memory::MemoryStore;
pub use store::{SessionRecord, SessionStore, SessionUpdate, Settings, SettingsStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/studyfocus[-dev]/` based on STUDYFOCUS_ENV.
///
/// Set STUDYFOCUS_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STUDYFOCUS_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("studyfocus-dev")
    } else {
        base_dir.join("studyfocus")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
