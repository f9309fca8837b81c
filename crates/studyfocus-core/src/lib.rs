//! # StudyFocus Core Library
//!
//! This library provides the core logic of the StudyFocus study timer. Like
//! the CLI built on it, any host (desktop shell, web backend, bot) is a thin
//! layer over the same engine.
//!
//! ## Architecture
//!
//! - **Timer**: a wall-clock countdown and a work/break state machine. Both
//!   are plain values that take the current time as an argument, so the
//!   caller (or the engine's ticker) drives `tick()`
//! - **Recorder**: the only writer of session records, with retry-once and
//!   local buffering when the store is down
//! - **Progress**: pure streak, achievement, XP and level evaluation over the
//!   record set
//! - **Engine**: ties the above together behind an async API with a
//!   broadcast event channel
//! - **Storage**: SQLite and in-memory session stores, TOML configuration
//!
//! ## Key Components
//!
//! - [`FocusEngine`]: one timer instance with injected store, clock and notifier
//! - [`SessionMachine`]: the state machine, serializable for checkpoints
//! - [`SessionRecorder`]: session persistence
//! - [`evaluate`]: progress snapshot from session records
//! - [`Database`] / [`Config`]: local persistence and configuration

pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod notify;
pub mod progress;
pub mod recorder;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineBuilder, EngineConfig, FocusEngine};
pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use events::Event;
pub use notify::{LogNotifier, Notifier, NullNotifier, RecordingNotifier};
pub use progress::{evaluate, EvaluationContext, ProgressSnapshot, Rollup};
pub use recorder::{SessionRecorder, SyncReport};
pub use storage::{
    Config, Database, MemoryStore, SessionRecord, SessionStore, SessionUpdate, Settings,
    SettingsStore,
};
pub use timer::{
    decide_break_duration, BreakKind, BreakPlan, DurationCatalog, ModeId, ModeOverrides, Phase,
    SessionMachine, SessionMode, TimerState,
};
