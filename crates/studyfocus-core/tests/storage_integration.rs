//! Engine against the SQLite store on disk, including the kv checkpoint
//! round trip the CLI relies on.

use std::sync::Arc;

use chrono::{FixedOffset, TimeZone, Utc};
use studyfocus_core::storage::Database;
use studyfocus_core::{
    Clock, EngineConfig, FocusEngine, ManualClock, Phase, SessionMachine, SessionRecorder,
};

const CHECKPOINT_KEY: &str = "engine_checkpoint";

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

async fn engine_on(
    db: Arc<Database>,
    clock: &ManualClock,
    restore: Option<SessionMachine>,
) -> FocusEngine {
    let mut builder = FocusEngine::builder(db)
        .clock(Arc::new(clock.clone()))
        .config(EngineConfig {
            user_id: "student".into(),
            offset: utc(),
            ..EngineConfig::default()
        });
    if let Some(machine) = restore {
        builder = builder.restore(machine);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn session_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("studyfocus.db");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 21, 30, 0).unwrap());

    // First invocation: start work and checkpoint.
    {
        let db = Arc::new(Database::open_at(&path).unwrap());
        let engine = engine_on(db.clone(), &clock, None).await;
        engine.start_work(Some("Essay draft".into())).await.unwrap();
        engine.flush().await;
        let checkpoint = serde_json::to_string(&engine.machine().await).unwrap();
        db.kv_set(CHECKPOINT_KEY, &checkpoint).unwrap();
    }

    clock.advance_secs(25 * 60);

    // Second invocation: restore, tick, persist.
    {
        let db = Arc::new(Database::open_at(&path).unwrap());
        let raw = db.kv_get(CHECKPOINT_KEY).unwrap().unwrap();
        let machine: SessionMachine = serde_json::from_str(&raw).unwrap();
        assert_eq!(machine.phase(), Phase::Working);

        let engine = engine_on(db.clone(), &clock, Some(machine)).await;
        engine.tick().await;
        engine.flush().await;
        assert_eq!(engine.state().await.phase, Phase::OnBreak);
        assert_eq!(engine.progress().total_focus_minutes, 25);
    }

    let db = Arc::new(Database::open_at(&path).unwrap());
    let recorder = SessionRecorder::new(db, "student", utc());
    let day = clock.now().date_naive();
    let records = recorder.today(day).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].completed);
    assert_eq!(records[0].actual_min, Some(25));
    assert_eq!(records[0].task_label.as_deref(), Some("Essay draft"));

    let summary = recorder.daily_summary(day).unwrap();
    assert_eq!(summary.sessions_completed, 1);
    assert_eq!(summary.focus_minutes, 25);
}

#[tokio::test]
async fn records_are_scoped_to_user() {
    let db = Arc::new(Database::open_memory().unwrap());
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap());
    let engine = engine_on(db.clone(), &clock, None).await;
    engine.start_work(None).await.unwrap();
    engine.flush().await;

    let day = clock.now().date_naive();
    let other = SessionRecorder::new(db.clone(), "someone-else", utc());
    assert!(other.today(day).unwrap().is_empty());
    let mine = SessionRecorder::new(db, "student", utc());
    assert_eq!(mine.today(day).unwrap().len(), 1);
}
