mod breaks;
mod catalog;
mod countdown;
mod machine;

pub use breaks::{decide_break_duration, BreakKind, BreakPlan};
pub use catalog::{DurationCatalog, ModeId, ModeOverrides, SessionMode, MAX_WORK_MIN, MIN_WORK_MIN};
pub use countdown::{ClockStatus, Countdown};
pub use machine::{ActiveSession, Phase, SessionMachine, TimerState};
