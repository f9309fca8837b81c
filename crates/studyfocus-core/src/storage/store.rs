//! The engine's only external boundary: a session store and a settings
//! store. Backends (hosted, SQLite, in-memory) implement these traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::timer::{ModeId, ModeOverrides};

/// One work-session attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub mode: ModeId,
    pub planned_min: u32,
    /// Set only when the session ran to zero.
    pub actual_min: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(default)]
    pub task_label: Option<String>,
}

impl SessionRecord {
    /// Focus minutes this record contributes to totals.
    pub fn focus_minutes(&self) -> u32 {
        if self.completed {
            self.actual_min.unwrap_or(0)
        } else {
            0
        }
    }
}

/// Partial update applied by `update_record`. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub actual_min: Option<u32>,
    pub ended_at: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
}

impl SessionUpdate {
    pub fn completion(actual_min: u32, ended_at: DateTime<Utc>) -> Self {
        Self {
            actual_min: Some(actual_min),
            ended_at: Some(ended_at),
            completed: Some(true),
        }
    }

    pub fn apply(&self, record: &mut SessionRecord) {
        if let Some(actual) = self.actual_min {
            record.actual_min = Some(actual);
        }
        if let Some(ended) = self.ended_at {
            record.ended_at = Some(ended);
        }
        if let Some(completed) = self.completed {
            record.completed = completed;
        }
    }
}

/// Per-user settings the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mode_overrides: ModeOverrides,
    pub auto_start_breaks: bool,
    pub notifications_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode_overrides: ModeOverrides::new(),
            auto_start_breaks: true,
            notifications_enabled: true,
        }
    }
}

/// Durable session storage keyed by user.
pub trait SessionStore: Send + Sync {
    /// Persist a new record. Returns the stored id.
    fn create_record(&self, record: &SessionRecord) -> Result<String, StoreError>;

    /// Amend an existing record and return its new contents.
    fn update_record(&self, id: &str, update: &SessionUpdate) -> Result<SessionRecord, StoreError>;

    /// Records of `user_id` whose `started_at` lies in `[start, end]`,
    /// ordered by start time.
    fn query_by_date_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StoreError>;
}

pub trait SettingsStore: Send + Sync {
    fn read_settings(&self, user_id: &str) -> Result<Settings, StoreError>;
}

/// Fixed settings, for hosts without a settings backend.
impl SettingsStore for Settings {
    fn read_settings(&self, _user_id: &str) -> Result<Settings, StoreError> {
        Ok(self.clone())
    }
}
