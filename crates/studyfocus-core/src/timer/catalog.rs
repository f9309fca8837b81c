//! Duration catalog: the static table of session modes.
//!
//! User overrides are layered on top through [`ModeOverrides`]; the
//! built-in entries are never mutated.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lower bound for any work duration, in minutes.
pub const MIN_WORK_MIN: u32 = 5;
/// Upper bound for any work duration, in minutes.
pub const MAX_WORK_MIN: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeId {
    ShortBurst,
    StandardFocus,
    DeepWork,
    Custom,
}

impl ModeId {
    pub const ALL: [ModeId; 4] = [
        ModeId::ShortBurst,
        ModeId::StandardFocus,
        ModeId::DeepWork,
        ModeId::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModeId::ShortBurst => "short-burst",
            ModeId::StandardFocus => "standard-focus",
            ModeId::DeepWork => "deep-work",
            ModeId::Custom => "custom",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModeId::ShortBurst => "Short Burst",
            ModeId::StandardFocus => "Standard Focus",
            ModeId::DeepWork => "Deep Work",
            ModeId::Custom => "Custom",
        }
    }
}

impl Default for ModeId {
    fn default() -> Self {
        ModeId::StandardFocus
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModeId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownMode(s.to_string()))
    }
}

/// A named timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMode {
    pub id: ModeId,
    /// Work duration in minutes.
    pub work_min: u32,
    pub short_break_min: u32,
    pub long_break_min: u32,
    /// Number of work sessions between long breaks (>= 1).
    pub long_break_interval: u32,
}

impl SessionMode {
    /// Built-in catalog entry for `id`.
    pub const fn builtin(id: ModeId) -> Self {
        let (work_min, short_break_min, long_break_min, long_break_interval) = match id {
            ModeId::ShortBurst => (15, 3, 10, 4),
            ModeId::StandardFocus => (25, 5, 15, 4),
            ModeId::DeepWork => (50, 10, 30, 3),
            ModeId::Custom => (45, 10, 20, 4),
        };
        Self {
            id,
            work_min,
            short_break_min,
            long_break_min,
            long_break_interval,
        }
    }

    pub fn work_secs(&self) -> u64 {
        u64::from(self.work_min).saturating_mul(60)
    }

    /// Reject entries that could not drive a countdown.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("work_min", self.work_min, MIN_WORK_MIN, MAX_WORK_MIN)?;
        check_range("short_break_min", self.short_break_min, 1, MAX_WORK_MIN)?;
        check_range("long_break_min", self.long_break_min, 1, MAX_WORK_MIN)?;
        if self.long_break_interval == 0 {
            return Err(ValidationError::InvalidValue {
                field: "long_break_interval".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn check_range(field: &str, minutes: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if (min..=max).contains(&minutes) {
        Ok(())
    } else {
        Err(ValidationError::DurationOutOfRange {
            field: field.into(),
            minutes,
            min,
            max,
        })
    }
}

/// Per-user work-duration overrides, keyed by mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeOverrides(BTreeMap<ModeId, u32>);

impl ModeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a work-duration override. Out-of-range values are rejected.
    pub fn set(&mut self, id: ModeId, work_min: u32) -> Result<(), ValidationError> {
        check_range("work_min", work_min, MIN_WORK_MIN, MAX_WORK_MIN)?;
        self.0.insert(id, work_min);
        Ok(())
    }

    pub fn get(&self, id: ModeId) -> Option<u32> {
        self.0.get(&id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build overrides from string keys (config files), rejecting unknown ids.
    pub fn from_named<'a, I>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a String, &'a u32)>,
    {
        let mut overrides = Self::new();
        for (name, minutes) in entries {
            overrides.set(name.parse()?, *minutes)?;
        }
        Ok(overrides)
    }
}

/// The static catalog plus the user's override layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationCatalog {
    #[serde(default)]
    overrides: ModeOverrides,
}

impl DurationCatalog {
    pub fn new(overrides: ModeOverrides) -> Self {
        Self { overrides }
    }

    pub fn overrides(&self) -> &ModeOverrides {
        &self.overrides
    }

    /// Resolve a mode with any work-duration override applied.
    pub fn resolve(&self, id: ModeId) -> Result<SessionMode, ValidationError> {
        let mut mode = SessionMode::builtin(id);
        if let Some(work_min) = self.overrides.get(id) {
            mode.work_min = work_min;
        }
        mode.validate()?;
        Ok(mode)
    }

    /// Resolve a mode by its string identifier.
    pub fn resolve_named(&self, name: &str) -> Result<SessionMode, ValidationError> {
        self.resolve(name.parse()?)
    }

    pub fn modes(&self) -> Vec<SessionMode> {
        ModeId::ALL
            .into_iter()
            .filter_map(|id| self.resolve(id).ok())
            .collect()
    }
}
