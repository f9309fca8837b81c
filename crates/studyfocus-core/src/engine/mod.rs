//! The focus engine: one explicit object per timer instance.
//!
//! Wraps a [`SessionMachine`] behind a `tokio` mutex, turns its events into
//! record jobs for the persistence worker, fires completion notifications
//! and broadcasts every event to subscribers. Time comes from an injected
//! [`Clock`]; ticks come either from [`FocusEngine::tick`] or from the
//! optional background ticker.

mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::notify::{LogNotifier, Notifier};
use crate::progress::{ProgressSnapshot, DEFAULT_XP_PER_MINUTE};
use crate::recorder::SessionRecorder;
use crate::storage::{Config, SessionStore, Settings, SettingsStore};
use crate::timer::{DurationCatalog, ModeId, Phase, SessionMachine, TimerState};

use worker::{RecordJob, RecordWorker};

/// Subscribers that fall further behind than this see `Lagged`.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub user_id: String,
    pub default_mode: ModeId,
    /// Local day boundaries for records and streaks.
    pub offset: FixedOffset,
    pub xp_per_minute: u64,
    /// `None`: the caller drives [`FocusEngine::tick`].
    pub tick_interval: Option<Duration>,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_id: "local".into(),
            default_mode: ModeId::default(),
            offset: Local::now().offset().fix(),
            xp_per_minute: DEFAULT_XP_PER_MINUTE,
            tick_interval: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            user_id: cfg.user_id.clone(),
            default_mode: cfg.timer.default_mode,
            offset: cfg.utc_offset(),
            xp_per_minute: cfg.progress.xp_per_minute,
            tick_interval: cfg.tick_interval(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

pub struct EngineBuilder {
    store: Arc<dyn SessionStore>,
    settings: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<dyn Notifier>>,
    machine: Option<SessionMachine>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Resume from a checkpointed machine instead of a fresh one.
    pub fn restore(mut self, machine: SessionMachine) -> Self {
        self.machine = Some(machine);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine and spawn its worker on the current runtime.
    ///
    /// # Errors
    /// Fails outside a tokio runtime, or if the settings carry an invalid
    /// override for the active mode.
    pub fn build(self) -> Result<FocusEngine> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Custom(format!("focus engine needs a tokio runtime: {e}")))?;

        let settings_store = self
            .settings
            .unwrap_or_else(|| Arc::new(Settings::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let config = self.config;

        let settings = read_settings(settings_store.as_ref(), &config.user_id);
        let catalog = DurationCatalog::new(settings.mode_overrides.clone());
        let mut machine = match self.machine {
            Some(machine) => machine,
            None => SessionMachine::new(catalog.clone(), config.default_mode)?,
        };
        machine.set_catalog(catalog)?;
        machine.set_auto_start_breaks(settings.auto_start_breaks);

        let recorder = Arc::new(SessionRecorder::new(
            self.store,
            config.user_id.clone(),
            config.offset,
        ));
        if let Some(session) = machine.active_session() {
            recorder.adopt_session(session);
        }

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (jobs, job_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress) = watch::channel(ProgressSnapshot::default());

        let worker = RecordWorker {
            recorder: Arc::clone(&recorder),
            clock: Arc::clone(&clock),
            events: events.clone(),
            progress: progress_tx,
            xp_per_minute: config.xp_per_minute,
            has_baseline: false,
        };
        runtime.spawn(worker.run(job_rx));

        let tick_interval = config.tick_interval;
        let engine = FocusEngine {
            inner: Arc::new(Inner {
                machine: Mutex::new(machine),
                clock,
                settings: settings_store,
                notifier,
                notifications_enabled: AtomicBool::new(settings.notifications_enabled),
                recorder,
                events,
                jobs,
                progress,
                ticker: std::sync::Mutex::new(None),
                config,
            }),
        };
        engine.submit(RecordJob::Refresh { announce: false });
        if let Some(period) = tick_interval {
            engine.start_ticker(period);
        }
        info!(user_id = %engine.inner.config.user_id, "focus engine started");
        Ok(engine)
    }
}

struct Inner {
    machine: Mutex<SessionMachine>,
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsStore>,
    notifier: Arc<dyn Notifier>,
    notifications_enabled: AtomicBool,
    recorder: Arc<SessionRecorder>,
    events: broadcast::Sender<Event>,
    jobs: mpsc::UnboundedSender<RecordJob>,
    progress: watch::Receiver<ProgressSnapshot>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
    config: EngineConfig,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self
            .ticker
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct FocusEngine {
    inner: Arc<Inner>,
}

impl FocusEngine {
    pub fn builder(store: Arc<dyn SessionStore>) -> EngineBuilder {
        EngineBuilder {
            store,
            settings: None,
            clock: None,
            notifier: None,
            machine: None,
            config: EngineConfig::default(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> TimerState {
        self.inner.machine.lock().await.state()
    }

    /// A `StateSnapshot` event for the current instant. Also broadcast.
    pub async fn snapshot(&self) -> Event {
        let machine = self.inner.machine.lock().await;
        let event = machine.snapshot(self.inner.clock.now());
        self.emit(event.clone());
        event
    }

    /// Copy of the machine, for checkpointing.
    pub async fn machine(&self) -> SessionMachine {
        self.inner.machine.lock().await.clone()
    }

    /// Latest evaluated progress.
    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.progress.borrow().clone()
    }

    pub fn recorder(&self) -> Arc<SessionRecorder> {
        Arc::clone(&self.inner.recorder)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Switch mode while idle. Invalid ids are rejected in any phase.
    pub async fn select_mode(&self, id: ModeId) -> Result<Option<Event>> {
        let mut machine = self.inner.machine.lock().await;
        let event = machine.select_mode(id, self.inner.clock.now())?;
        if let Some(event) = &event {
            self.emit(event.clone());
        }
        Ok(event)
    }

    pub async fn select_mode_named(&self, name: &str) -> Result<Option<Event>> {
        self.select_mode(name.parse()?).await
    }

    pub async fn start_work(&self, task_label: Option<String>) -> Option<Event> {
        let mut machine = self.inner.machine.lock().await;
        let event = machine.start_work(task_label, self.inner.clock.now())?;
        if let Some(session) = machine.active_session() {
            self.submit(RecordJob::Begin(session.clone()));
        }
        self.emit(event.clone());
        Some(event)
    }

    pub async fn pause(&self) -> Option<Event> {
        let mut machine = self.inner.machine.lock().await;
        let event = machine.pause(self.inner.clock.now())?;
        self.emit(event.clone());
        Some(event)
    }

    pub async fn resume(&self) -> Option<Event> {
        let mut machine = self.inner.machine.lock().await;
        let event = machine.resume(self.inner.clock.now())?;
        self.emit(event.clone());
        Some(event)
    }

    /// Stop the running work session, or skip the running break.
    pub async fn stop(&self) -> Option<Event> {
        let mut machine = self.inner.machine.lock().await;
        let now = self.inner.clock.now();
        let event = match machine.phase() {
            Phase::Working => machine.stop(now)?,
            Phase::OnBreak => machine.skip_break(now)?,
            Phase::Idle => return None,
        };
        self.dispatch(std::slice::from_ref(&event), None);
        Some(event)
    }

    pub async fn skip_break(&self) -> Option<Event> {
        let mut machine = self.inner.machine.lock().await;
        let event = machine.skip_break(self.inner.clock.now())?;
        self.emit(event.clone());
        Some(event)
    }

    pub async fn start_break(&self) -> Option<Event> {
        let mut machine = self.inner.machine.lock().await;
        let event = machine.start_break(self.inner.clock.now())?;
        self.emit(event.clone());
        Some(event)
    }

    pub async fn reset(&self) -> Vec<Event> {
        let mut machine = self.inner.machine.lock().await;
        let events = machine.reset(self.inner.clock.now());
        self.dispatch(&events, None);
        events
    }

    /// Advance the countdown to the clock's current time.
    pub async fn tick(&self) -> Vec<Event> {
        let mut machine = self.inner.machine.lock().await;
        let active = machine.active_session().cloned();
        let events = machine.tick(self.inner.clock.now());
        self.dispatch(&events, active);
        events
    }

    /// Re-read the settings store and apply overrides and toggles.
    ///
    /// # Errors
    /// Returns the store error or a validation error for the new overrides;
    /// the machine keeps its previous settings in both cases.
    pub async fn reload_settings(&self) -> Result<Settings> {
        let settings = self.inner.settings.read_settings(&self.inner.config.user_id)?;
        let mut machine = self.inner.machine.lock().await;
        machine.set_catalog(DurationCatalog::new(settings.mode_overrides.clone()))?;
        machine.set_auto_start_breaks(settings.auto_start_breaks);
        self.inner
            .notifications_enabled
            .store(settings.notifications_enabled, Ordering::SeqCst);
        debug!("settings reloaded");
        Ok(settings)
    }

    /// Retry records that never reached the store.
    pub async fn sync_pending(&self) {
        self.submit(RecordJob::Sync);
        self.flush().await;
    }

    /// Wait until every queued record job has been handled.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        self.submit(RecordJob::Flush(ack));
        let _ = done.await;
    }

    // ── Ticker ───────────────────────────────────────────────────────

    /// Tick on a fixed period until cancelled or the engine is dropped.
    pub fn start_ticker(&self, period: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                FocusEngine { inner }.tick().await;
            }
        });

        let mut slot = self.inner.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel_ticker(&self) {
        let mut slot = self.inner.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    pub fn ticker_running(&self) -> bool {
        self.inner
            .ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop ticking and drain pending record jobs.
    pub async fn shutdown(&self) {
        self.cancel_ticker();
        self.flush().await;
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Broadcast machine events and queue their side effects.
    /// `finished` is the work session that was on the clock before a tick.
    fn dispatch(&self, events: &[Event], finished: Option<crate::timer::ActiveSession>) {
        for event in events {
            match event {
                Event::WorkCompleted {
                    session_id, mode, ..
                } => {
                    self.submit(RecordJob::Complete {
                        session: finished.clone().filter(|s| &s.id == session_id),
                        id: session_id.clone(),
                        ended_at: event.at(),
                    });
                    self.notify(
                        "Session complete",
                        format!("{} session finished. Time for a break.", mode.label()),
                    );
                }
                Event::WorkStopped { session_id, .. } => {
                    self.submit(RecordJob::Abandon(session_id.clone()));
                }
                Event::BreakCompleted { kind, .. } => {
                    self.notify(
                        "Break over",
                        format!("{} finished. Ready to focus?", kind.label()),
                    );
                }
                _ => {}
            }
            self.emit(event.clone());
        }
    }

    fn submit(&self, job: RecordJob) {
        if self.inner.jobs.send(job).is_err() {
            warn!("record worker is gone; job dropped");
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.inner.events.send(event);
    }

    fn notify(&self, title: &'static str, body: String) {
        if !self.inner.notifications_enabled.load(Ordering::SeqCst) {
            return;
        }
        let notifier = Arc::clone(&self.inner.notifier);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = notifier.notify(title, &body) {
                warn!(error = %e, "notification failed");
            }
        });
    }
}

fn read_settings(store: &dyn SettingsStore, user_id: &str) -> Settings {
    store.read_settings(user_id).unwrap_or_else(|e| {
        warn!(error = %e, "settings unavailable, using defaults");
        Settings::default()
    })
}
