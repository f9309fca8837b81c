//! Session state machine.
//!
//! Owns the active mode, the countdown and the count of completed work
//! sessions. Like the countdown it is a plain value: the caller passes the
//! current time into every command and calls `tick()` periodically. Each
//! command returns the events it produced; illegal transitions return
//! nothing.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start_work--> Working --completion--> OnBreak (auto-start)
//!                         |                 \-> Idle + pending break
//!                         +--stop--> Idle
//! Idle(pending) --start_break--> OnBreak --completion|skip--> Idle
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::breaks::{decide_break_duration, BreakKind, BreakPlan};
use super::catalog::{DurationCatalog, ModeId, SessionMode};
use super::countdown::Countdown;
use crate::clock::epoch_ms;
use crate::error::ValidationError;
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Working,
    OnBreak,
}

/// Point-in-time view of the machine, as shown by any timer surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub mode: ModeId,
    pub phase: Phase,
    pub remaining_secs: u64,
    pub total_secs: u64,
    pub is_paused: bool,
    pub completed_work_count: u32,
    /// Break decided after the last work session but not yet started.
    pub pending_break: Option<BreakPlan>,
    pub session_id: Option<String>,
}

/// The work session currently on the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub id: String,
    pub mode: ModeId,
    pub planned_min: u32,
    pub started_at: DateTime<Utc>,
    pub task_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMachine {
    catalog: DurationCatalog,
    mode: SessionMode,
    phase: Phase,
    countdown: Countdown,
    completed_work_count: u32,
    auto_start_breaks: bool,
    #[serde(default)]
    active: Option<ActiveSession>,
    #[serde(default)]
    current_break: Option<BreakPlan>,
    #[serde(default)]
    pending_break: Option<BreakPlan>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self {
            catalog: DurationCatalog::default(),
            mode: SessionMode::builtin(ModeId::default()),
            phase: Phase::Idle,
            countdown: Countdown::new(),
            completed_work_count: 0,
            auto_start_breaks: true,
            active: None,
            current_break: None,
            pending_break: None,
        }
    }
}

impl SessionMachine {
    pub fn new(catalog: DurationCatalog, mode: ModeId) -> Result<Self, ValidationError> {
        let mode = catalog.resolve(mode)?;
        Ok(Self {
            catalog,
            mode,
            ..Self::default()
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn catalog(&self) -> &DurationCatalog {
        &self.catalog
    }

    pub fn completed_work_count(&self) -> u32 {
        self.completed_work_count
    }

    pub fn auto_start_breaks(&self) -> bool {
        self.auto_start_breaks
    }

    pub fn active_session(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn pending_break(&self) -> Option<BreakPlan> {
        self.pending_break
    }

    pub fn total_secs(&self) -> u64 {
        match self.phase {
            Phase::Idle => self.mode.work_secs(),
            Phase::Working | Phase::OnBreak => self.countdown.total_secs(),
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        match self.phase {
            Phase::Idle => self.mode.work_secs(),
            Phase::Working | Phase::OnBreak => self.countdown.remaining_secs(),
        }
    }

    /// 0.0 ..= 100.0 progress within the current phase.
    pub fn progress_pct(&self) -> f64 {
        match self.phase {
            Phase::Idle => 0.0,
            Phase::Working | Phase::OnBreak => self.countdown.progress_pct(),
        }
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            mode: self.mode.id,
            phase: self.phase,
            remaining_secs: self.remaining_secs(),
            total_secs: self.total_secs(),
            is_paused: self.phase != Phase::Idle && self.countdown.is_paused(),
            completed_work_count: self.completed_work_count,
            pending_break: self.pending_break,
            session_id: self.active.as_ref().map(|s| s.id.clone()),
        }
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Event {
        Event::StateSnapshot {
            state: self.state(),
            progress_pct: self.progress_pct(),
            at: now,
        }
    }

    // ── Configuration ────────────────────────────────────────────────

    pub fn set_auto_start_breaks(&mut self, enabled: bool) {
        self.auto_start_breaks = enabled;
    }

    /// Swap the override layer. The active mode picks up the change
    /// immediately when idle, otherwise on the next return to idle.
    pub fn set_catalog(&mut self, catalog: DurationCatalog) -> Result<(), ValidationError> {
        catalog.resolve(self.mode.id)?;
        self.catalog = catalog;
        if self.phase == Phase::Idle {
            self.refresh_mode();
        }
        Ok(())
    }

    /// Switch the active mode. Unknown or invalid modes are rejected;
    /// switching outside `Idle` is silently ignored.
    pub fn select_mode(
        &mut self,
        id: ModeId,
        now: DateTime<Utc>,
    ) -> Result<Option<Event>, ValidationError> {
        let mode = self.catalog.resolve(id)?;
        if self.phase != Phase::Idle {
            return Ok(None);
        }
        self.mode = mode;
        Ok(Some(Event::ModeChanged {
            mode: id,
            work_secs: mode.work_secs(),
            at: now,
        }))
    }

    pub fn select_mode_named(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Event>, ValidationError> {
        self.select_mode(name.parse()?, now)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a work session. Any pending break is discarded.
    pub fn start_work(&mut self, task_label: Option<String>, now: DateTime<Utc>) -> Option<Event> {
        if self.phase != Phase::Idle {
            return None;
        }
        self.refresh_mode();
        self.pending_break = None;
        self.countdown.arm(self.mode.work_secs());
        self.countdown.start(epoch_ms(now));
        self.phase = Phase::Working;

        let task_label = task_label
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let session = ActiveSession {
            id: Uuid::new_v4().to_string(),
            mode: self.mode.id,
            planned_min: self.mode.work_min,
            started_at: now,
            task_label,
        };
        let event = Event::WorkStarted {
            session_id: session.id.clone(),
            mode: session.mode,
            planned_min: session.planned_min,
            task_label: session.task_label.clone(),
            at: now,
        };
        self.active = Some(session);
        Some(event)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.phase == Phase::Idle || !self.countdown.pause(epoch_ms(now)) {
            return None;
        }
        Some(Event::TimerPaused {
            remaining_secs: self.countdown.remaining_secs(),
            at: now,
        })
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.phase == Phase::Idle || !self.countdown.resume(epoch_ms(now)) {
            return None;
        }
        Some(Event::TimerResumed {
            remaining_secs: self.countdown.remaining_secs(),
            at: now,
        })
    }

    /// Manually end a work session. The attempt is never marked complete,
    /// even if its time ran out since the last tick.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.phase != Phase::Working {
            return None;
        }
        let remaining_secs = self.countdown.remaining_secs_at(epoch_ms(now));
        self.countdown.cancel();
        self.enter_idle();
        let session = self.active.take()?;
        Some(Event::WorkStopped {
            session_id: session.id,
            remaining_secs,
            at: now,
        })
    }

    /// Abandon the running break, or discard a pending one.
    pub fn skip_break(&mut self, now: DateTime<Utc>) -> Option<Event> {
        match self.phase {
            Phase::OnBreak => {
                self.countdown.cancel();
                self.current_break = None;
                self.enter_idle();
                Some(Event::BreakSkipped { at: now })
            }
            Phase::Idle if self.pending_break.is_some() => {
                self.pending_break = None;
                Some(Event::BreakSkipped { at: now })
            }
            _ => None,
        }
    }

    /// Start the break that was scheduled but not auto-started.
    pub fn start_break(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.phase != Phase::Idle {
            return None;
        }
        let plan = self.pending_break.take()?;
        Some(self.begin_break(plan, now))
    }

    /// Explicit user reset: back to idle with the work count cleared.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(stopped) = self.stop(now) {
            events.push(stopped);
        }
        self.countdown.cancel();
        self.current_break = None;
        self.pending_break = None;
        self.completed_work_count = 0;
        self.enter_idle();
        events.push(Event::TimerReset { at: now });
        events
    }

    /// Call periodically. Returns the events of every phase that finished.
    ///
    /// Each phase ends at the instant it actually reached zero, so a late
    /// tick completes an overdue work session, then the auto-started break
    /// chained from it, without stretching either.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            if self.phase == Phase::Idle || !self.countdown.tick(epoch_ms(now)) {
                return events;
            }
            let ended_at = self
                .countdown
                .finished_at_ms()
                .and_then(from_epoch_ms)
                .map_or(now, |at| at.min(now));
            match self.phase {
                Phase::Working => events.extend(self.complete_work(ended_at)),
                Phase::OnBreak => events.push(self.complete_break(ended_at)),
                Phase::Idle => return events,
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete_work(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::with_capacity(3);
        self.completed_work_count = self.completed_work_count.saturating_add(1);
        if let Some(session) = self.active.take() {
            events.push(Event::WorkCompleted {
                session_id: session.id,
                mode: session.mode,
                completed_work_count: self.completed_work_count,
                at: now,
            });
        }

        let plan = decide_break_duration(&self.mode, self.completed_work_count);
        events.push(Event::BreakScheduled {
            kind: plan.kind,
            duration_min: plan.duration_min,
            auto_start: self.auto_start_breaks,
            at: now,
        });

        if self.auto_start_breaks {
            events.push(self.begin_break(plan, now));
        } else {
            self.countdown.cancel();
            self.enter_idle();
            self.pending_break = Some(plan);
        }
        events
    }

    fn complete_break(&mut self, ended_at: DateTime<Utc>) -> Event {
        let kind = self
            .current_break
            .take()
            .map(|plan| plan.kind)
            .unwrap_or(BreakKind::Short);
        self.countdown.cancel();
        self.enter_idle();
        Event::BreakCompleted { kind, at: ended_at }
    }

    fn begin_break(&mut self, plan: BreakPlan, now: DateTime<Utc>) -> Event {
        self.countdown.arm(plan.duration_secs());
        self.countdown.start(epoch_ms(now));
        self.phase = Phase::OnBreak;
        self.current_break = Some(plan);
        Event::BreakStarted {
            kind: plan.kind,
            duration_secs: plan.duration_secs(),
            at: now,
        }
    }

    fn enter_idle(&mut self) {
        self.phase = Phase::Idle;
        self.refresh_mode();
    }

    fn refresh_mode(&mut self) {
        if let Ok(mode) = self.catalog.resolve(self.mode.id) {
            self.mode = mode;
        }
    }
}

fn from_epoch_ms(ms: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(i64::try_from(ms).ok()?)
}
