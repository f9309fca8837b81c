//! Progress & achievement evaluation.
//!
//! Everything here is a pure function of a set of session records plus the
//! static rule and level tables. The resulting [`ProgressSnapshot`] is a
//! cache: recompute it instead of mutating it.

pub mod achievements;
pub mod levels;
mod rollup;
pub mod streak;

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::SessionRecord;

pub use achievements::{Achievement, AggregateStats, ACHIEVEMENTS};
pub use levels::{level_for_xp, LEVEL_THRESHOLDS};
pub use rollup::Rollup;

/// XP awarded per completed focus minute unless configured otherwise.
pub const DEFAULT_XP_PER_MINUTE: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_sessions: u64,
    pub total_focus_minutes: u64,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub level: u32,
    pub xp: u64,
    pub unlocked_achievements: BTreeSet<String>,
}

/// Where "today" is and how records map onto local days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationContext {
    pub today: NaiveDate,
    pub offset: FixedOffset,
    pub xp_per_minute: u64,
}

impl EvaluationContext {
    pub fn new(today: NaiveDate, offset: FixedOffset) -> Self {
        Self {
            today,
            offset,
            xp_per_minute: DEFAULT_XP_PER_MINUTE,
        }
    }

    /// The local day containing `now`, as seen from `offset`.
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::new(now.with_timezone(&offset).date_naive(), offset)
    }

    pub fn with_xp_per_minute(mut self, xp_per_minute: u64) -> Self {
        self.xp_per_minute = xp_per_minute;
        self
    }
}

/// Recompute progress from scratch. Record order does not matter.
pub fn evaluate(records: &[SessionRecord], ctx: &EvaluationContext) -> ProgressSnapshot {
    let days = streak::active_days(records, ctx.offset);
    let mut stats = AggregateStats::from_records(records, ctx.offset);
    stats.current_streak_days = streak::current_streak(&days, ctx.today);
    stats.longest_streak_days = streak::longest_streak(&days);

    let mut unlocked_achievements = BTreeSet::new();
    let mut bonus_xp = 0u64;
    for achievement in achievements::unlocked(&stats) {
        if unlocked_achievements.insert(achievement.id.to_string()) {
            bonus_xp = bonus_xp.saturating_add(achievement.xp_bonus);
        }
    }

    let xp = stats
        .total_focus_minutes
        .saturating_mul(ctx.xp_per_minute)
        .saturating_add(bonus_xp);

    ProgressSnapshot {
        total_sessions: stats.completed_sessions,
        total_focus_minutes: stats.total_focus_minutes,
        current_streak_days: stats.current_streak_days,
        longest_streak_days: stats.longest_streak_days,
        level: level_for_xp(xp),
        xp,
        unlocked_achievements,
    }
}

/// Achievements present in `next` but not in `previous`, in table order.
pub fn newly_unlocked(
    previous: &ProgressSnapshot,
    next: &ProgressSnapshot,
) -> Vec<&'static Achievement> {
    ACHIEVEMENTS
        .iter()
        .filter(|a| {
            next.unlocked_achievements.contains(a.id)
                && !previous.unlocked_achievements.contains(a.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ModeId;
    use chrono::{DateTime, Duration, TimeZone};

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    fn session(start: DateTime<Utc>, minutes: u32, completed: bool) -> SessionRecord {
        SessionRecord {
            id: format!("{}-{minutes}", start.timestamp()),
            user_id: "u".into(),
            mode: ModeId::Custom,
            planned_min: minutes,
            actual_min: completed.then_some(minutes),
            started_at: start,
            ended_at: completed.then(|| start + Duration::minutes(i64::from(minutes))),
            completed,
            task_label: None,
        }
    }

    fn on_day(days_ago: i64, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap() - Duration::days(days_ago)
    }

    #[test]
    fn context_today_follows_offset() {
        let late = Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap();
        let utc = EvaluationContext::at(late, FixedOffset::east_opt(0).unwrap());
        assert_eq!(utc.today, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());

        let tokyo = EvaluationContext::at(late, FixedOffset::east_opt(9 * 3600).unwrap());
        assert_eq!(tokyo.today, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert_eq!(tokyo.xp_per_minute, DEFAULT_XP_PER_MINUTE);
    }

    #[test]
    fn empty_record_set() {
        let snap = evaluate(&[], &ctx());
        assert_eq!(snap.total_sessions, 0);
        assert_eq!(snap.current_streak_days, 0);
        assert_eq!(snap.xp, 0);
        assert_eq!(snap.level, 1);
        assert!(snap.unlocked_achievements.is_empty());
    }

    #[test]
    fn two_thirty_minute_sessions_today() {
        let records = vec![
            session(on_day(0, 10), 30, true),
            session(on_day(0, 14), 30, true),
        ];
        let snap = evaluate(&records, &ctx());
        assert_eq!(snap.total_focus_minutes, 60);
        assert!(snap.xp >= 600);
        // 600 focus xp + first-session bonus.
        assert_eq!(snap.xp, 650);
        assert_eq!(snap.level, 2);
        assert_eq!(snap.current_streak_days, 1);
    }

    #[test]
    fn stopped_attempts_excluded_from_totals() {
        let records = vec![
            session(on_day(0, 10), 25, true),
            session(on_day(0, 11), 25, false),
        ];
        let snap = evaluate(&records, &ctx());
        assert_eq!(snap.total_sessions, 1);
        assert_eq!(snap.total_focus_minutes, 25);
    }

    #[test]
    fn streak_with_gap() {
        let records = vec![
            session(on_day(0, 10), 25, true),
            session(on_day(2, 10), 25, true),
        ];
        let snap = evaluate(&records, &ctx());
        assert_eq!(snap.current_streak_days, 1);
        assert_eq!(snap.longest_streak_days, 1);
    }

    #[test]
    fn evaluation_is_idempotent_and_order_free() {
        let mut records: Vec<_> = (0..8)
            .map(|d| session(on_day(d, 7), 95, true))
            .collect();
        let first = evaluate(&records, &ctx());
        let second = evaluate(&records, &ctx());
        assert_eq!(first, second);

        records.reverse();
        assert_eq!(evaluate(&records, &ctx()), first);

        for id in ["first-session", "early-bird", "deep-focus", "consistency", "marathon"] {
            assert!(first.unlocked_achievements.contains(id), "{id}");
        }
        assert_eq!(first.current_streak_days, 8);
    }

    #[test]
    fn newly_unlocked_reports_only_new() {
        let before = evaluate(&[session(on_day(0, 10), 25, true)], &ctx());
        let after = evaluate(
            &[
                session(on_day(0, 10), 25, true),
                session(on_day(0, 12), 90, true),
            ],
            &ctx(),
        );
        let ids: Vec<_> = newly_unlocked(&before, &after).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["deep-focus"]);
        assert!(newly_unlocked(&after, &after).is_empty());
    }

    #[test]
    fn xp_per_minute_configurable() {
        let records = vec![session(on_day(0, 10), 10, true)];
        let snap = evaluate(&records, &ctx().with_xp_per_minute(20));
        assert_eq!(snap.xp, 200 + 50);
    }
}
