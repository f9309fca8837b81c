use serde::{Deserialize, Serialize};

use super::catalog::SessionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Short,
    Long,
}

impl BreakKind {
    pub fn label(&self) -> &'static str {
        match self {
            BreakKind::Short => "Short Break",
            BreakKind::Long => "Long Break",
        }
    }
}

/// The break chosen after a work session completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakPlan {
    pub kind: BreakKind,
    pub duration_min: u32,
}

impl BreakPlan {
    pub fn duration_secs(&self) -> u64 {
        u64::from(self.duration_min).saturating_mul(60)
    }
}

/// Pick the break that follows the `completed_work_count`-th work session.
///
/// Long iff the count is a positive multiple of the mode's long-break
/// interval. An interval of 0 is treated as 1.
pub fn decide_break_duration(mode: &SessionMode, completed_work_count: u32) -> BreakPlan {
    let interval = mode.long_break_interval.max(1);
    if completed_work_count > 0 && completed_work_count % interval == 0 {
        BreakPlan {
            kind: BreakKind::Long,
            duration_min: mode.long_break_min,
        }
    } else {
        BreakPlan {
            kind: BreakKind::Short,
            duration_min: mode.short_break_min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::catalog::ModeId;
    use proptest::prelude::*;

    #[test]
    fn standard_focus_cycle() {
        let mode = SessionMode::builtin(ModeId::StandardFocus);
        let kinds: Vec<_> = (1..=8)
            .map(|n| decide_break_duration(&mode, n).kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Long,
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Long,
            ]
        );
        assert_eq!(decide_break_duration(&mode, 4).duration_min, 15);
        assert_eq!(decide_break_duration(&mode, 3).duration_min, 5);
    }

    #[test]
    fn zero_count_is_short() {
        let mode = SessionMode::builtin(ModeId::StandardFocus);
        assert_eq!(decide_break_duration(&mode, 0).kind, BreakKind::Short);
    }

    #[test]
    fn interval_of_one_is_always_long() {
        let mut mode = SessionMode::builtin(ModeId::Custom);
        mode.long_break_interval = 1;
        for n in 1..10 {
            assert_eq!(decide_break_duration(&mode, n).kind, BreakKind::Long);
        }
    }

    proptest! {
        #[test]
        fn long_iff_positive_multiple(count in 0u32..10_000, interval in 1u32..12) {
            let mut mode = SessionMode::builtin(ModeId::StandardFocus);
            mode.long_break_interval = interval;
            let plan = decide_break_duration(&mode, count);
            let expect_long = count > 0 && count % interval == 0;
            prop_assert_eq!(plan.kind == BreakKind::Long, expect_long);
            let expected_min = if expect_long { mode.long_break_min } else { mode.short_break_min };
            prop_assert_eq!(plan.duration_min, expected_min);
        }
    }
}
