//! End-to-end engine scenarios against the in-memory store.
//!
//! Time is driven by a `ManualClock`; the caller ticks explicitly, except in
//! the ticker test.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use studyfocus_core::{
    BreakKind, EngineConfig, Event, FocusEngine, ManualClock, MemoryStore, ModeId, ModeOverrides,
    Phase, RecordingNotifier, SessionMachine, Settings,
};
use tokio::sync::broadcast;

// ============================================================================
// Test Helpers
// ============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        offset: FixedOffset::east_opt(0).unwrap(),
        ..EngineConfig::default()
    }
}

struct Harness {
    engine: FocusEngine,
    store: Arc<MemoryStore>,
    clock: ManualClock,
    notifier: Arc<RecordingNotifier>,
    events: broadcast::Receiver<Event>,
}

async fn harness_with(
    settings: Settings,
    restore: Option<SessionMachine>,
    store: Arc<MemoryStore>,
) -> Harness {
    let clock = ManualClock::new(t0());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut builder = FocusEngine::builder(store.clone())
        .settings(Arc::new(settings))
        .clock(Arc::new(clock.clone()))
        .notifier(notifier.clone())
        .config(config());
    if let Some(machine) = restore {
        builder = builder.restore(machine);
    }
    let engine = builder.build().unwrap();
    let events = engine.subscribe();
    // Let the baseline progress refresh settle before tests inject failures.
    engine.flush().await;
    Harness {
        engine,
        store,
        clock,
        notifier,
        events,
    }
}

async fn harness() -> Harness {
    harness_with(Settings::default(), None, Arc::new(MemoryStore::new())).await
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

impl Harness {
    async fn run_work_session(&mut self, secs: i64) -> Vec<Event> {
        self.engine.start_work(None).await.unwrap();
        self.clock.advance_secs(secs);
        self.engine.tick().await
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn fourth_standard_session_earns_long_break() {
    let mut h = harness().await;
    let mut kinds = Vec::new();

    for _ in 0..4 {
        let events = h.run_work_session(25 * 60).await;
        assert!(matches!(events[0], Event::WorkCompleted { .. }));
        let Event::BreakStarted { kind, duration_secs, .. } = &events[2] else {
            panic!("expected auto-started break, got {events:?}");
        };
        kinds.push(*kind);

        h.clock.advance_secs(*duration_secs as i64);
        let done = h.engine.tick().await;
        assert!(matches!(done[..], [Event::BreakCompleted { .. }]));
    }

    assert_eq!(
        kinds,
        vec![BreakKind::Short, BreakKind::Short, BreakKind::Short, BreakKind::Long]
    );
    h.engine.flush().await;

    let records = h.store.records();
    assert_eq!(records.len(), 4);
    assert!(records
        .iter()
        .all(|r| r.completed && r.actual_min == Some(25) && r.mode == ModeId::StandardFocus));
    assert_eq!(h.engine.state().await.completed_work_count, 4);
}

#[tokio::test]
async fn manual_stop_leaves_incomplete_record() {
    let mut h = harness().await;
    let started = h.engine.start_work(Some("Chapter 3".into())).await.unwrap();
    let Event::WorkStarted { session_id, .. } = started else {
        panic!("expected WorkStarted");
    };

    h.clock.advance_secs(300);
    h.engine.tick().await;
    let stopped = h.engine.stop().await.unwrap();
    assert!(matches!(
        stopped,
        Event::WorkStopped { remaining_secs: 1200, .. }
    ));
    h.engine.flush().await;

    let record = h.store.get(&session_id).unwrap();
    assert!(!record.completed);
    assert_eq!(record.actual_min, None);
    assert_eq!(record.ended_at, None);
    assert_eq!(record.task_label.as_deref(), Some("Chapter 3"));

    let state = h.engine.state().await;
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.completed_work_count, 0);
    assert_eq!(state.remaining_secs, state.total_secs);
    assert!(drain(&mut h.events)
        .iter()
        .all(|e| !matches!(e, Event::ProgressUpdated { .. })));
}

#[tokio::test]
async fn two_half_hour_sessions_yield_progress_and_level_up() {
    let mut overrides = ModeOverrides::new();
    overrides.set(ModeId::Custom, 30).unwrap();
    let settings = Settings {
        mode_overrides: overrides,
        auto_start_breaks: false,
        notifications_enabled: true,
    };
    let mut h = harness_with(settings, None, Arc::new(MemoryStore::new())).await;

    h.engine.select_mode(ModeId::Custom).await.unwrap();
    let first = h.run_work_session(30 * 60).await;
    assert!(matches!(
        first[1],
        Event::BreakScheduled { auto_start: false, .. }
    ));
    h.engine.skip_break().await.unwrap();
    h.run_work_session(30 * 60).await;
    h.engine.flush().await;

    let progress = h.engine.progress();
    assert_eq!(progress.total_focus_minutes, 60);
    assert!(progress.xp >= 600);
    assert_eq!(progress.current_streak_days, 1);
    assert!(progress.unlocked_achievements.contains("first-session"));

    let events = drain(&mut h.events);
    let unlocked: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::AchievementUnlocked { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(unlocked, vec!["first-session"]);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::LevelUp { level: 2, .. })));
}

#[tokio::test]
async fn store_outage_warns_but_timer_keeps_running() {
    let mut h = harness().await;
    h.store.fail_next(2);

    h.engine.start_work(None).await.unwrap();
    h.engine.flush().await;

    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::PersistenceWarning { operation, .. } if operation == "begin_session"
    )));
    assert_eq!(h.engine.state().await.phase, Phase::Working);
    assert!(h.store.is_empty());

    // The buffered record is written in full on completion.
    h.clock.advance_secs(25 * 60);
    h.engine.tick().await;
    h.engine.flush().await;

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].completed);
    assert_eq!(h.engine.recorder().pending_count(), 0);
}

#[tokio::test]
async fn failed_completion_is_synced_later() {
    let mut h = harness().await;
    h.engine.start_work(None).await.unwrap();
    h.engine.flush().await;

    h.store.fail_next(2);
    h.clock.advance_secs(25 * 60);
    h.engine.tick().await;
    h.engine.flush().await;
    assert!(!h.store.records()[0].completed);
    assert!(drain(&mut h.events).iter().any(|e| matches!(
        e,
        Event::PersistenceWarning { operation, .. } if operation == "complete_session"
    )));

    h.engine.sync_pending().await;
    assert!(h.store.records()[0].completed);
    assert_eq!(h.engine.progress().total_focus_minutes, 25);
}

#[tokio::test]
async fn mode_validation_beats_phase_check() {
    let h = harness().await;
    h.engine.start_work(None).await.unwrap();

    assert!(h.engine.select_mode_named("cram").await.is_err());
    assert_eq!(h.engine.select_mode(ModeId::DeepWork).await.unwrap(), None);
    assert_eq!(h.engine.state().await.mode, ModeId::StandardFocus);
}

#[tokio::test]
async fn stop_during_break_skips_it() {
    let mut h = harness().await;
    h.run_work_session(25 * 60).await;
    assert_eq!(h.engine.state().await.phase, Phase::OnBreak);

    let event = h.engine.stop().await.unwrap();
    assert!(matches!(event, Event::BreakSkipped { .. }));
    assert_eq!(h.engine.state().await.phase, Phase::Idle);
    assert_eq!(h.engine.state().await.completed_work_count, 1);
}

#[tokio::test]
async fn reset_clears_count_and_abandons_session() {
    let mut h = harness().await;
    h.run_work_session(25 * 60).await;
    h.engine.skip_break().await.unwrap();
    h.engine.start_work(None).await.unwrap();

    let events = h.engine.reset().await;
    assert!(matches!(events[0], Event::WorkStopped { .. }));
    assert!(matches!(events[1], Event::TimerReset { .. }));
    h.engine.flush().await;

    let state = h.engine.state().await;
    assert_eq!(state.completed_work_count, 0);
    assert_eq!(state.phase, Phase::Idle);
    let completed = h.store.records().iter().filter(|r| r.completed).count();
    assert_eq!(completed, 1);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn restored_checkpoint_completes_session() {
    let store = Arc::new(MemoryStore::new());
    let first = harness_with(Settings::default(), None, store.clone()).await;
    first.engine.start_work(None).await.unwrap();
    first.engine.flush().await;
    let checkpoint = serde_json::to_string(&first.engine.machine().await).unwrap();
    drop(first);

    let machine: SessionMachine = serde_json::from_str(&checkpoint).unwrap();
    let second = harness_with(Settings::default(), Some(machine), store.clone()).await;
    second.clock.advance_secs(25 * 60);
    let events = second.engine.tick().await;
    assert!(matches!(events[0], Event::WorkCompleted { .. }));
    second.engine.flush().await;

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].completed);
    assert_eq!(records[0].actual_min, Some(25));
}

#[tokio::test]
async fn late_tick_records_the_planned_duration() {
    let h = harness().await;
    h.engine.start_work(None).await.unwrap();
    h.clock.advance_secs(3 * 3600);
    let events = h.engine.tick().await;
    h.engine.flush().await;

    let finished = t0() + chrono::Duration::minutes(25);
    assert!(matches!(events[0], Event::WorkCompleted { .. }));
    assert_eq!(events[0].at(), finished);
    assert!(matches!(events.last(), Some(Event::BreakCompleted { .. })));
    assert_eq!(h.engine.state().await.phase, Phase::Idle);

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actual_min, Some(25));
    assert_eq!(records[0].ended_at, Some(finished));
    assert_eq!(h.engine.progress().total_focus_minutes, 25);
}

#[tokio::test]
async fn unlocks_announced_after_failed_startup_refresh() {
    let store = Arc::new(MemoryStore::new());
    // Both attempts of the startup progress query fail.
    store.fail_next(2);
    let mut h = harness_with(Settings::default(), None, store).await;

    h.run_work_session(25 * 60).await;
    h.engine.flush().await;

    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::AchievementUnlocked { id, .. } if id == "first-session"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ProgressUpdated { .. })));
    assert!(h
        .engine
        .progress()
        .unlocked_achievements
        .contains("first-session"));
}

#[tokio::test]
async fn completion_notifies_when_enabled() {
    let mut h = harness().await;
    h.run_work_session(25 * 60).await;

    for _ in 0..100 {
        if !h.notifier.sent().is_empty() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Session complete");
}

#[tokio::test]
async fn background_ticker_completes_work() {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(t0());
    let engine = FocusEngine::builder(store.clone())
        .clock(Arc::new(clock.clone()))
        .config(EngineConfig {
            tick_interval: Some(StdDuration::from_millis(10)),
            ..config()
        })
        .build()
        .unwrap();
    let mut rx = engine.subscribe();
    assert!(engine.ticker_running());

    engine.start_work(None).await.unwrap();
    clock.advance_secs(25 * 60);

    let completed = tokio::time::timeout(StdDuration::from_secs(2), async {
        loop {
            if let Ok(Event::WorkCompleted { .. }) = rx.recv().await {
                break;
            }
        }
    })
    .await;
    assert!(completed.is_ok(), "ticker never completed the session");

    engine.shutdown().await;
    assert!(!engine.ticker_running());
    assert_eq!(store.records().len(), 1);
}
