use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::progress::ProgressSnapshot;
use crate::timer::{BreakKind, ModeId, TimerState};

/// Every state change in the engine produces an Event.
/// Observers (timer display, daily summary, celebrations) subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ModeChanged {
        mode: ModeId,
        work_secs: u64,
        at: DateTime<Utc>,
    },
    WorkStarted {
        session_id: String,
        mode: ModeId,
        planned_min: u32,
        task_label: Option<String>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// Work phase reached zero naturally.
    WorkCompleted {
        session_id: String,
        mode: ModeId,
        completed_work_count: u32,
        at: DateTime<Utc>,
    },
    /// Work phase ended by the user; the attempt stays incomplete.
    WorkStopped {
        session_id: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// The break following a work session was decided.
    BreakScheduled {
        kind: BreakKind,
        duration_min: u32,
        auto_start: bool,
        at: DateTime<Utc>,
    },
    BreakStarted {
        kind: BreakKind,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    BreakCompleted {
        kind: BreakKind,
        at: DateTime<Utc>,
    },
    BreakSkipped {
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: TimerState,
        progress_pct: f64,
        at: DateTime<Utc>,
    },
    /// A store write failed twice; local state remains authoritative.
    PersistenceWarning {
        operation: String,
        message: String,
        at: DateTime<Utc>,
    },
    ProgressUpdated {
        snapshot: ProgressSnapshot,
        at: DateTime<Utc>,
    },
    AchievementUnlocked {
        id: String,
        title: String,
        xp_bonus: u64,
        at: DateTime<Utc>,
    },
    LevelUp {
        level: u32,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::ModeChanged { at, .. }
            | Event::WorkStarted { at, .. }
            | Event::TimerPaused { at, .. }
            | Event::TimerResumed { at, .. }
            | Event::WorkCompleted { at, .. }
            | Event::WorkStopped { at, .. }
            | Event::BreakScheduled { at, .. }
            | Event::BreakStarted { at, .. }
            | Event::BreakCompleted { at, .. }
            | Event::BreakSkipped { at }
            | Event::TimerReset { at }
            | Event::StateSnapshot { at, .. }
            | Event::PersistenceWarning { at, .. }
            | Event::ProgressUpdated { at, .. }
            | Event::AchievementUnlocked { at, .. }
            | Event::LevelUp { at, .. } => *at,
        }
    }
}
