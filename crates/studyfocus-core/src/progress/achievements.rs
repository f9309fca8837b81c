//! Fixed achievement rule table.
//!
//! Rules are predicates over [`AggregateStats`] and are evaluated in table
//! order. Unlocking is a set union: a rule that holds is reported every
//! time, never twice.

use chrono::{FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

use crate::storage::SessionRecord;

/// Sessions started before this local hour count as early.
pub const EARLY_BIRD_HOUR: u32 = 9;
/// Sessions started at or after this local hour count as late.
pub const NIGHT_OWL_HOUR: u32 = 22;

/// Aggregates the rule table is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub completed_sessions: u64,
    pub total_focus_minutes: u64,
    pub longest_session_min: u32,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub has_early_session: bool,
    pub has_late_session: bool,
}

impl AggregateStats {
    /// Fold completed records into aggregates. Streaks are filled in by
    /// the caller.
    pub fn from_records(records: &[SessionRecord], offset: FixedOffset) -> Self {
        let mut stats = Self::default();
        for record in records.iter().filter(|r| r.completed) {
            let minutes = record.focus_minutes();
            stats.completed_sessions += 1;
            stats.total_focus_minutes += u64::from(minutes);
            stats.longest_session_min = stats.longest_session_min.max(minutes);

            let hour = record.started_at.with_timezone(&offset).hour();
            stats.has_early_session |= hour < EARLY_BIRD_HOUR;
            stats.has_late_session |= hour >= NIGHT_OWL_HOUR;
        }
        stats
    }
}

#[derive(Debug)]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub xp_bonus: u64,
    rule: fn(&AggregateStats) -> bool,
}

impl Achievement {
    pub fn is_met(&self, stats: &AggregateStats) -> bool {
        (self.rule)(stats)
    }
}

pub static ACHIEVEMENTS: [Achievement; 8] = [
    Achievement {
        id: "first-session",
        title: "First Step",
        description: "Complete your first focus session",
        xp_bonus: 50,
        rule: |s| s.completed_sessions >= 1,
    },
    Achievement {
        id: "early-bird",
        title: "Early Bird",
        description: "Complete a session started before 9 AM",
        xp_bonus: 100,
        rule: |s| s.has_early_session,
    },
    Achievement {
        id: "night-owl",
        title: "Night Owl",
        description: "Complete a session started after 10 PM",
        xp_bonus: 100,
        rule: |s| s.has_late_session,
    },
    Achievement {
        id: "deep-focus",
        title: "Deep Focus",
        description: "Complete a single session of 90 minutes or more",
        xp_bonus: 200,
        rule: |s| s.longest_session_min >= 90,
    },
    Achievement {
        id: "consistency",
        title: "Consistency",
        description: "Study seven days in a row",
        xp_bonus: 250,
        rule: |s| s.longest_streak_days >= 7,
    },
    Achievement {
        id: "marathon",
        title: "Marathon",
        description: "Accumulate ten hours of focus",
        xp_bonus: 300,
        rule: |s| s.total_focus_minutes >= 600,
    },
    Achievement {
        id: "dedicated",
        title: "Dedicated",
        description: "Complete 50 focus sessions",
        xp_bonus: 250,
        rule: |s| s.completed_sessions >= 50,
    },
    Achievement {
        id: "centurion",
        title: "Centurion",
        description: "Complete 100 focus sessions",
        xp_bonus: 500,
        rule: |s| s.completed_sessions >= 100,
    },
];

pub fn find(id: &str) -> Option<&'static Achievement> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

/// Achievements whose rule holds, in table order.
pub fn unlocked(stats: &AggregateStats) -> impl Iterator<Item = &'static Achievement> + '_ {
    ACHIEVEMENTS.iter().filter(move |a| a.is_met(stats))
}
