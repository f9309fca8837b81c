//! Day streaks over completed sessions.

use std::collections::BTreeSet;

use chrono::{FixedOffset, NaiveDate};

use crate::storage::SessionRecord;

/// Local calendar days with at least one completed session.
pub fn active_days(records: &[SessionRecord], offset: FixedOffset) -> BTreeSet<NaiveDate> {
    records
        .iter()
        .filter(|r| r.completed)
        .map(|r| r.started_at.with_timezone(&offset).date_naive())
        .collect()
}

/// Consecutive active days ending today. Today is exempt: if it has no
/// activity yet, the walk starts at yesterday.
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut day = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(d) => d,
            None => return 0,
        }
    };

    let mut streak = 0;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Longest run of consecutive active days anywhere in the set.
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for &day in days {
        run = match prev {
            Some(p) if p.succ_opt() == Some(day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(day);
    }
    longest
}
