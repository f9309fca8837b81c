//! Date-ranged aggregates for the daily summary and weekly views.

use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::storage::SessionRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    /// Every attempt, including ones stopped early.
    pub sessions_started: u64,
    pub sessions_completed: u64,
    /// `sessions_completed / sessions_started`, 0.0 when nothing started.
    pub completion_rate: f64,
    pub focus_minutes: u64,
    /// Focus minutes per local calendar day.
    pub by_day: BTreeMap<NaiveDate, u64>,
}

impl Rollup {
    pub fn from_records(records: &[SessionRecord], offset: FixedOffset) -> Self {
        let mut rollup = Self::default();
        for record in records {
            rollup.sessions_started += 1;
            let day = record.started_at.with_timezone(&offset).date_naive();
            let minutes = u64::from(record.focus_minutes());
            if record.completed {
                rollup.sessions_completed += 1;
                rollup.focus_minutes += minutes;
            }
            *rollup.by_day.entry(day).or_insert(0) += minutes;
        }
        if rollup.sessions_started > 0 {
            rollup.completion_rate =
                rollup.sessions_completed as f64 / rollup.sessions_started as f64;
        }
        rollup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ModeId;
    use chrono::{TimeZone, Utc};

    #[test]
    fn completion_rate_counts_stopped_attempts() {
        let start = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
        let done = SessionRecord {
            id: "1".into(),
            user_id: "u".into(),
            mode: ModeId::StandardFocus,
            planned_min: 25,
            actual_min: Some(25),
            started_at: start,
            ended_at: Some(start + chrono::Duration::minutes(25)),
            completed: true,
            task_label: None,
        };
        let stopped = SessionRecord {
            id: "2".into(),
            actual_min: None,
            ended_at: None,
            completed: false,
            ..done.clone()
        };

        let rollup = Rollup::from_records(&[done, stopped], FixedOffset::east_opt(0).unwrap());
        assert_eq!(rollup.sessions_started, 2);
        assert_eq!(rollup.sessions_completed, 1);
        assert_eq!(rollup.focus_minutes, 25);
        assert!((rollup.completion_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(rollup.by_day.len(), 1);
    }

    #[test]
    fn empty_rollup() {
        let rollup = Rollup::from_records(&[], FixedOffset::east_opt(0).unwrap());
        assert_eq!(rollup.completion_rate, 0.0);
        assert!(rollup.by_day.is_empty());
    }
}
