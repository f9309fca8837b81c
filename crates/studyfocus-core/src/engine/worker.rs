//! Persistence worker: drains [`RecordJob`]s in order on its own task so
//! store latency never reaches the countdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::progress::{evaluate, newly_unlocked, EvaluationContext, ProgressSnapshot};
use crate::recorder::SessionRecorder;
use crate::timer::ActiveSession;

#[derive(Debug)]
pub(crate) enum RecordJob {
    Begin(ActiveSession),
    Complete {
        session: Option<ActiveSession>,
        id: String,
        ended_at: DateTime<Utc>,
    },
    Abandon(String),
    /// Re-evaluate progress. `announce: false` only sets the baseline.
    Refresh { announce: bool },
    Sync,
    Flush(oneshot::Sender<()>),
}

pub(crate) struct RecordWorker {
    pub recorder: Arc<SessionRecorder>,
    pub clock: Arc<dyn Clock>,
    pub events: broadcast::Sender<Event>,
    pub progress: watch::Sender<ProgressSnapshot>,
    pub xp_per_minute: u64,
    pub has_baseline: bool,
}

impl RecordWorker {
    pub async fn run(mut self, mut jobs: mpsc::UnboundedReceiver<RecordJob>) {
        while let Some(job) = jobs.recv().await {
            self.handle(job).await;
        }
        debug!("record worker stopped");
    }

    async fn handle(&mut self, job: RecordJob) {
        match job {
            RecordJob::Begin(session) => {
                let recorder = Arc::clone(&self.recorder);
                let result = blocking(move || recorder.begin_session(&session).map(|_| ())).await;
                if let Err(e) = result {
                    self.warn("begin_session", &e);
                }
            }
            RecordJob::Complete {
                session,
                id,
                ended_at,
            } => {
                let recorder = Arc::clone(&self.recorder);
                let completed_id = id.clone();
                let result = blocking(move || {
                    if let Some(session) = &session {
                        recorder.adopt_session(session);
                    }
                    recorder.complete_session(&id, ended_at).map(|_| ())
                })
                .await;
                if let Err(e) = result {
                    self.warn("complete_session", &e);
                }
                self.refresh(true, Some(&completed_id)).await;
            }
            RecordJob::Abandon(id) => {
                self.recorder.abandon_session(&id);
            }
            RecordJob::Refresh { announce } => self.refresh(announce, None).await,
            RecordJob::Sync => {
                let recorder = Arc::clone(&self.recorder);
                match blocking(move || Ok(recorder.sync_pending())).await {
                    Ok(report) if report.synced > 0 => self.refresh(true, None).await,
                    Ok(_) => {}
                    Err(e) => self.warn("sync_pending", &e),
                }
            }
            RecordJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    /// `completed_id`: the session whose completion triggered this refresh.
    async fn refresh(&mut self, announce: bool, completed_id: Option<&str>) {
        let now = self.clock.now();
        let ctx = EvaluationContext::at(now, self.recorder.offset())
            .with_xp_per_minute(self.xp_per_minute);

        let recorder = Arc::clone(&self.recorder);
        let records = match blocking(move || recorder.all_records(ctx.today)).await {
            Ok(records) => records,
            Err(e) => {
                self.warn("refresh_progress", &e);
                return;
            }
        };
        let next = evaluate(&records, &ctx);

        if announce {
            let previous = if self.has_baseline {
                self.progress.borrow().clone()
            } else {
                // The startup baseline never loaded: diff against history
                // without the session that just completed.
                let earlier: Vec<_> = records
                    .iter()
                    .filter(|r| Some(r.id.as_str()) != completed_id)
                    .cloned()
                    .collect();
                evaluate(&earlier, &ctx)
            };
            for achievement in newly_unlocked(&previous, &next) {
                info!(achievement = achievement.id, "achievement unlocked");
                self.emit(Event::AchievementUnlocked {
                    id: achievement.id.to_string(),
                    title: achievement.title.to_string(),
                    xp_bonus: achievement.xp_bonus,
                    at: now,
                });
            }
            if next.level > previous.level {
                info!(level = next.level, xp = next.xp, "level up");
                self.emit(Event::LevelUp {
                    level: next.level,
                    at: now,
                });
            }
            self.emit(Event::ProgressUpdated {
                snapshot: next.clone(),
                at: now,
            });
        }

        self.has_baseline = true;
        self.progress.send_replace(next);
    }

    fn warn(&self, operation: &str, error: &CoreError) {
        warn!(operation, error = %error, "persistence failed; timer continues");
        self.emit(Event::PersistenceWarning {
            operation: operation.to_string(),
            message: error.to_string(),
            at: self.clock.now(),
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Custom(format!("store task failed: {e}")))?
}
