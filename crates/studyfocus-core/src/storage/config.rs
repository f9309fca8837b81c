//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Default study mode and break behavior
//! - Per-mode work-duration overrides
//! - Notification and progress settings
//! - Log level
//!
//! Configuration is stored at `~/.config/studyfocus/config.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::data_dir;
use super::store::{Settings, SettingsStore};
use crate::error::{ConfigError, StoreError};
use crate::progress::{EvaluationContext, DEFAULT_XP_PER_MINUTE};
use crate::timer::{ModeId, ModeOverrides};

/// Keys that may be absent from the serialized config but can still be set.
const OPTIONAL_KEYS: &[&str] = &["progress.utc_offset_minutes"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default)]
    pub default_mode: ModeId,
    #[serde(default = "default_true")]
    pub auto_start_breaks: bool,
    /// Ticker period for long-running hosts. 0 disables the ticker.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_xp_per_minute")]
    pub xp_per_minute: u64,
    /// Fixed offset for day boundaries; the host's local offset when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/studyfocus/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub timer: TimerConfig,
    /// Work-duration overrides in minutes, keyed by mode id.
    #[serde(default)]
    pub modes: BTreeMap<String, u32>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_xp_per_minute() -> u64 {
    DEFAULT_XP_PER_MINUTE
}
fn default_log_level() -> String {
    "info".into()
}
fn default_user_id() -> String {
    "local".into()
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            default_mode: ModeId::default(),
            auto_start_breaks: true,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            xp_per_minute: DEFAULT_XP_PER_MINUTE,
            utc_offset_minutes: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            timer: TimerConfig::default(),
            modes: BTreeMap::new(),
            notifications: NotificationsConfig::default(),
            progress: ProgressConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }
        let open_slot = key.starts_with("modes.") || OPTIONAL_KEYS.contains(&key);

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = match obj.get(part) {
                    Some(v) => v.clone(),
                    None if open_slot => Value::Null,
                    None => return Err(unknown()),
                };

                let new_value = match existing {
                    Value::Bool(_) => Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    Value::Number(_) | Value::Null => {
                        if let Ok(n) = value.parse::<u64>() {
                            Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    Value::Object(_) | Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    Value::String(_) => Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the default config when none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default config");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, keeping the existing value's type.
    /// Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid for it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let next: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// All leaf keys with their values, sorted by key.
    pub fn list(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
            match value {
                Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Reject overrides outside the accepted bounds or for unknown modes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mode_overrides()?;
        if let Some(minutes) = self.progress.utc_offset_minutes {
            if FixedOffset::east_opt(minutes.saturating_mul(60)).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: "progress.utc_offset_minutes".into(),
                    message: format!("{minutes} is not a valid UTC offset"),
                });
            }
        }
        Ok(())
    }

    pub fn mode_overrides(&self) -> Result<ModeOverrides, ConfigError> {
        ModeOverrides::from_named(&self.modes).map_err(|e| ConfigError::InvalidValue {
            key: "modes".into(),
            message: e.to_string(),
        })
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            mode_overrides: self.mode_overrides()?,
            auto_start_breaks: self.timer.auto_start_breaks,
            notifications_enabled: self.notifications.enabled,
        })
    }

    /// Offset used to map timestamps onto local calendar days.
    pub fn utc_offset(&self) -> FixedOffset {
        self.progress
            .utc_offset_minutes
            .and_then(|m| FixedOffset::east_opt(m.saturating_mul(60)))
            .unwrap_or_else(|| Local::now().offset().fix())
    }

    pub fn evaluation_context(&self, now: DateTime<Utc>) -> EvaluationContext {
        EvaluationContext::at(now, self.utc_offset())
            .with_xp_per_minute(self.progress.xp_per_minute)
    }

    /// `None` when the background ticker is disabled.
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.timer.tick_interval_ms > 0)
            .then(|| Duration::from_millis(self.timer.tick_interval_ms))
    }
}

impl SettingsStore for Config {
    fn read_settings(&self, _user_id: &str) -> Result<Settings, StoreError> {
        self.settings()
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}
