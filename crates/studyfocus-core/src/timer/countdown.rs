//! Countdown clock.
//!
//! Like the rest of the timer, the countdown has no thread of its own:
//! the caller passes the current wall-clock time (epoch milliseconds) into
//! every command and calls `tick()` periodically. Remaining time is
//! recomputed from the wall-clock delta since the last anchor, so late or
//! missed ticks never accumulate drift.
//!
//! ```text
//! Idle -arm-> Armed -start-> Running <-pause/resume-> Paused
//!                              |
//!                              +-tick reaches 0-> Finished
//! any -cancel-> Idle
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockStatus {
    Idle,
    Armed,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Countdown {
    status: ClockStatus,
    total_ms: u64,
    remaining_ms: u64,
    /// Wall-clock anchor of the last flush while running.
    #[serde(default)]
    last_tick_epoch_ms: Option<u64>,
    /// Wall-clock instant remaining time hit zero, once finished.
    #[serde(default)]
    finished_at_epoch_ms: Option<u64>,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Countdown {
    pub fn new() -> Self {
        Self {
            status: ClockStatus::Idle,
            total_ms: 0,
            remaining_ms: 0,
            last_tick_epoch_ms: None,
            finished_at_epoch_ms: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> ClockStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == ClockStatus::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == ClockStatus::Paused
    }

    pub fn total_secs(&self) -> u64 {
        self.total_ms / 1000
    }

    /// Remaining whole seconds, rounded up so a fresh countdown shows its
    /// full duration and 0 only appears once time is really up.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_ms.div_ceil(1000)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// When the countdown reached zero. A late tick still reports the
    /// instant the time actually ran out, not the tick's own time.
    pub fn finished_at_ms(&self) -> Option<u64> {
        self.finished_at_epoch_ms
    }

    /// Remaining time as of `now_ms`, without mutating the countdown.
    pub fn remaining_secs_at(&self, now_ms: u64) -> u64 {
        match (self.status, self.last_tick_epoch_ms) {
            (ClockStatus::Running, Some(last)) => self
                .remaining_ms
                .saturating_sub(now_ms.saturating_sub(last))
                .div_ceil(1000),
            _ => self.remaining_secs(),
        }
    }

    /// 0.0 ..= 100.0 progress of the armed duration.
    pub fn progress_pct(&self) -> f64 {
        if self.total_ms == 0 {
            return 0.0;
        }
        let elapsed = self.total_ms.saturating_sub(self.remaining_ms) as f64;
        (elapsed / self.total_ms as f64 * 100.0).clamp(0.0, 100.0)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Load a fresh duration. Any previous run is discarded.
    pub fn arm(&mut self, total_secs: u64) {
        self.total_ms = total_secs.saturating_mul(1000);
        self.remaining_ms = self.total_ms;
        self.status = ClockStatus::Armed;
        self.last_tick_epoch_ms = None;
        self.finished_at_epoch_ms = None;
    }

    /// Begin counting down. Returns `false` if not armed (including when
    /// already running).
    pub fn start(&mut self, now_ms: u64) -> bool {
        if self.status != ClockStatus::Armed {
            return false;
        }
        self.status = ClockStatus::Running;
        self.last_tick_epoch_ms = Some(now_ms);
        true
    }

    pub fn pause(&mut self, now_ms: u64) -> bool {
        if self.status != ClockStatus::Running {
            return false;
        }
        self.flush_elapsed(now_ms);
        self.status = ClockStatus::Paused;
        self.last_tick_epoch_ms = None;
        true
    }

    pub fn resume(&mut self, now_ms: u64) -> bool {
        if self.status != ClockStatus::Paused {
            return false;
        }
        self.status = ClockStatus::Running;
        self.last_tick_epoch_ms = Some(now_ms);
        true
    }

    /// Stop without completing. Elapsed time is not flushed, so a pending
    /// completion is dropped.
    pub fn cancel(&mut self) {
        *self = Self::new();
    }

    /// Advance to `now_ms`. Returns `true` exactly once, on the tick that
    /// reaches zero.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if self.status != ClockStatus::Running {
            return false;
        }
        let zero_at = self
            .last_tick_epoch_ms
            .map(|last| last.saturating_add(self.remaining_ms).min(now_ms.max(last)));
        self.flush_elapsed(now_ms);
        if self.remaining_ms == 0 {
            self.status = ClockStatus::Finished;
            self.last_tick_epoch_ms = None;
            self.finished_at_epoch_ms = Some(zero_at.unwrap_or(now_ms));
            return true;
        }
        false
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn flush_elapsed(&mut self, now_ms: u64) {
        if let Some(last) = self.last_tick_epoch_ms {
            // A clock that stepped backwards counts as no time elapsed.
            let elapsed = now_ms.saturating_sub(last);
            self.remaining_ms = self.remaining_ms.saturating_sub(elapsed);
            self.last_tick_epoch_ms = Some(now_ms.max(last));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn arm_start_tick_complete() {
        let mut c = Countdown::new();
        c.arm(3);
        assert_eq!(c.status(), ClockStatus::Armed);
        assert_eq!(c.remaining_secs(), 3);

        assert!(c.start(T0));
        assert!(!c.tick(T0 + 1_000));
        assert_eq!(c.remaining_secs(), 2);
        assert!(!c.tick(T0 + 2_000));
        assert!(c.tick(T0 + 3_000));
        assert_eq!(c.status(), ClockStatus::Finished);
        assert_eq!(c.remaining_secs(), 0);
    }

    #[test]
    fn completion_fires_once() {
        let mut c = Countdown::new();
        c.arm(1);
        c.start(T0);
        assert!(c.tick(T0 + 5_000));
        assert!(!c.tick(T0 + 6_000));
        assert!(!c.tick(T0 + 7_000));

        c.arm(1);
        c.start(T0 + 8_000);
        assert!(c.tick(T0 + 9_000));
    }

    #[test]
    fn late_tick_reports_actual_zero_instant() {
        let mut c = Countdown::new();
        c.arm(60);
        c.start(T0);
        c.tick(T0 + 20_000);
        assert!(c.finished_at_ms().is_none());

        assert!(c.tick(T0 + 3_600_000));
        assert_eq!(c.finished_at_ms(), Some(T0 + 60_000));

        c.arm(60);
        assert!(c.finished_at_ms().is_none());
    }

    #[test]
    fn start_when_running_is_noop() {
        let mut c = Countdown::new();
        c.arm(60);
        assert!(c.start(T0));
        assert!(!c.start(T0 + 10_000));
        c.tick(T0 + 10_000);
        // Anchor was not reset by the second start.
        assert_eq!(c.remaining_secs(), 50);
    }

    #[test]
    fn pause_when_not_running_is_noop() {
        let mut c = Countdown::new();
        assert!(!c.pause(T0));
        c.arm(60);
        assert!(!c.pause(T0));
        assert_eq!(c.status(), ClockStatus::Armed);
    }

    #[test]
    fn pause_freezes_remaining() {
        let mut c = Countdown::new();
        c.arm(60);
        c.start(T0);
        assert!(c.pause(T0 + 10_000));
        assert_eq!(c.remaining_secs(), 50);

        // Time passing while paused is ignored.
        assert!(!c.tick(T0 + 100_000));
        assert_eq!(c.remaining_secs(), 50);

        assert!(c.resume(T0 + 100_000));
        c.tick(T0 + 105_000);
        assert_eq!(c.remaining_secs(), 45);
    }

    #[test]
    fn missed_ticks_do_not_drift() {
        let mut c = Countdown::new();
        c.arm(600);
        c.start(T0);
        // Backgrounded for 5 minutes, single late tick.
        c.tick(T0 + 300_400);
        assert_eq!(c.remaining_secs(), 300);
    }

    #[test]
    fn cancel_never_completes() {
        let mut c = Countdown::new();
        c.arm(1);
        c.start(T0);
        c.cancel();
        assert!(!c.tick(T0 + 10_000));
        assert_eq!(c.status(), ClockStatus::Idle);
        assert_eq!(c.remaining_secs(), 0);
    }

    #[test]
    fn progress_pct_clamped() {
        let mut c = Countdown::new();
        assert_eq!(c.progress_pct(), 0.0);
        c.arm(100);
        c.start(T0);
        c.tick(T0 + 25_000);
        assert!((c.progress_pct() - 25.0).abs() < f64::EPSILON);
        c.tick(T0 + 500_000);
        assert_eq!(c.progress_pct(), 100.0);
    }

    #[test]
    fn clock_stepping_backwards_is_ignored() {
        let mut c = Countdown::new();
        c.arm(60);
        c.start(T0);
        c.tick(T0 + 10_000);
        c.tick(T0 + 5_000);
        assert_eq!(c.remaining_secs(), 50);
        c.tick(T0 + 11_000);
        assert_eq!(c.remaining_secs(), 49);
    }

    proptest! {
        #[test]
        fn remaining_is_monotonic(
            total in 1u64..7_200,
            steps in prop::collection::vec(0u64..5_000, 1..64),
        ) {
            let mut c = Countdown::new();
            c.arm(total);
            c.start(T0);
            let mut now = T0;
            let mut last = c.remaining_secs();
            for step in steps {
                now += step;
                c.tick(now);
                let remaining = c.remaining_secs();
                prop_assert!(remaining <= last);
                prop_assert!(remaining <= total);
                last = remaining;
            }
        }

        #[test]
        fn completes_at_most_once(
            total in 1u64..120,
            steps in prop::collection::vec(0u64..10_000, 1..64),
        ) {
            let mut c = Countdown::new();
            c.arm(total);
            c.start(T0);
            let mut now = T0;
            let mut fired = 0;
            for step in steps {
                now += step;
                if c.tick(now) {
                    fired += 1;
                }
            }
            prop_assert!(fired <= 1);
        }
    }
}
