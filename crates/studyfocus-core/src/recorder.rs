//! Session recorder: the only writer of [`SessionRecord`]s.
//!
//! Writes go through the injected [`SessionStore`]. A failed write is
//! retried once immediately; if that fails too the error is returned to the
//! caller as non-fatal and the record is kept locally. Local records are the
//! authority until [`SessionRecorder::sync_pending`] gets them into the
//! store, and they shadow stored copies in range queries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result, StoreError};
use crate::progress::{evaluate, EvaluationContext, ProgressSnapshot, Rollup};
use crate::storage::{SessionRecord, SessionStore, SessionUpdate};
use crate::timer::ActiveSession;

#[derive(Debug, Clone)]
struct PendingRecord {
    record: SessionRecord,
    /// The create reached the store.
    stored: bool,
    /// Work phase still on the clock; nothing to sync yet beyond the create.
    in_flight: bool,
}

/// Outcome of a [`SessionRecorder::sync_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

pub struct SessionRecorder {
    store: Arc<dyn SessionStore>,
    user_id: String,
    offset: FixedOffset,
    pending: Mutex<HashMap<String, PendingRecord>>,
}

impl SessionRecorder {
    pub fn new(
        store: Arc<dyn SessionStore>,
        user_id: impl Into<String>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            offset,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Records not yet fully written to the store.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Create and persist the record for a work session that just started.
    /// The record is kept locally even if the write fails.
    pub fn begin_session(&self, session: &ActiveSession) -> Result<SessionRecord> {
        let record = SessionRecord {
            id: session.id.clone(),
            user_id: self.user_id.clone(),
            mode: session.mode,
            planned_min: session.planned_min,
            actual_min: None,
            started_at: session.started_at,
            ended_at: None,
            completed: false,
            task_label: session.task_label.clone(),
        };
        self.lock().insert(
            record.id.clone(),
            PendingRecord {
                record: record.clone(),
                stored: false,
                in_flight: true,
            },
        );

        self.create_with_retry(&record)?;
        if let Some(entry) = self.lock().get_mut(&record.id) {
            entry.stored = true;
        }
        info!(session_id = %record.id, mode = %record.mode, "session started");
        Ok(record)
    }

    /// Track a session begun by an earlier process, e.g. one restored from
    /// a checkpoint. Assumed stored; completion falls back to a create if
    /// the store has never seen it.
    pub fn adopt_session(&self, session: &ActiveSession) {
        let mut pending = self.lock();
        if pending.contains_key(&session.id) {
            return;
        }
        pending.insert(
            session.id.clone(),
            PendingRecord {
                record: SessionRecord {
                    id: session.id.clone(),
                    user_id: self.user_id.clone(),
                    mode: session.mode,
                    planned_min: session.planned_min,
                    actual_min: None,
                    started_at: session.started_at,
                    ended_at: None,
                    completed: false,
                    task_label: session.task_label.clone(),
                },
                stored: true,
                in_flight: true,
            },
        );
        debug!(session_id = %session.id, "session adopted");
    }

    /// Mark a session complete as of `ended_at` and persist it.
    pub fn complete_session(&self, id: &str, ended_at: DateTime<Utc>) -> Result<SessionRecord> {
        let (record, stored) = {
            let mut pending = self.lock();
            let entry = pending
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let actual = actual_minutes(entry.record.started_at, ended_at);
            SessionUpdate::completion(actual, ended_at).apply(&mut entry.record);
            entry.in_flight = false;
            (entry.record.clone(), entry.stored)
        };

        let result = if stored {
            let update = SessionUpdate::completion(record.actual_min.unwrap_or(0), ended_at);
            match self.with_retry("update_record", || self.store.update_record(id, &update)) {
                Err(StoreError::NotFound(_)) => {
                    self.create_with_retry(&record).map(|_| record.clone())
                }
                other => other,
            }
        } else {
            // The create never landed; write the finished record in one go.
            self.create_with_retry(&record).map(|_| record.clone())
        };

        match result {
            Ok(saved) => {
                self.lock().remove(id);
                info!(
                    session_id = %id,
                    actual_min = saved.actual_min.unwrap_or(0),
                    "session completed"
                );
                Ok(saved)
            }
            Err(e) => Err(CoreError::Store(e)),
        }
    }

    /// Forget a manually stopped session. It stays incomplete in the store;
    /// if it never reached the store it is written on the next sync.
    pub fn abandon_session(&self, id: &str) {
        let mut pending = self.lock();
        match pending.get_mut(id) {
            Some(entry) if entry.stored => {
                pending.remove(id);
            }
            Some(entry) => entry.in_flight = false,
            None => {}
        }
        debug!(session_id = %id, "session abandoned");
    }

    /// Retry every local record that has not reached the store.
    pub fn sync_pending(&self) -> SyncReport {
        let candidates: Vec<PendingRecord> = self
            .lock()
            .values()
            .filter(|p| !p.in_flight || !p.stored)
            .cloned()
            .collect();

        let mut report = SyncReport::default();
        for entry in candidates {
            let id = entry.record.id.clone();
            let result = if entry.stored {
                let update = SessionUpdate {
                    actual_min: entry.record.actual_min,
                    ended_at: entry.record.ended_at,
                    completed: Some(entry.record.completed),
                };
                self.with_retry("update_record", || self.store.update_record(&id, &update))
                    .map(|_| ())
            } else {
                self.create_with_retry(&entry.record)
            };

            match result {
                Ok(()) => {
                    report.synced += 1;
                    let mut pending = self.lock();
                    if entry.in_flight {
                        if let Some(p) = pending.get_mut(&id) {
                            p.stored = true;
                        }
                    } else {
                        pending.remove(&id);
                    }
                }
                Err(_) => report.failed += 1,
            }
        }
        if report.synced > 0 || report.failed > 0 {
            info!(synced = report.synced, failed = report.failed, "pending sessions synced");
        }
        report
    }

    /// Records whose start falls on a local date in `[start_date, end_date]`.
    pub fn query_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<SessionRecord>> {
        let start = local_midnight_utc(start_date, self.offset);
        let end = match end_date.succ_opt() {
            Some(next) => local_midnight_utc(next, self.offset) - Duration::milliseconds(1),
            None => DateTime::<Utc>::MAX_UTC,
        };

        let stored = self.with_retry("query_by_date_range", || {
            self.store.query_by_date_range(&self.user_id, start, end)
        })?;

        let mut by_id: HashMap<String, SessionRecord> =
            stored.into_iter().map(|r| (r.id.clone(), r)).collect();
        for entry in self.lock().values() {
            let r = &entry.record;
            if r.started_at >= start && r.started_at <= end {
                by_id.insert(r.id.clone(), r.clone());
            }
        }

        let mut records: Vec<SessionRecord> = by_id.into_values().collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn today(&self, today: NaiveDate) -> Result<Vec<SessionRecord>> {
        self.query_range(today, today)
    }

    /// Records of the ISO week (Monday start) containing `today`.
    pub fn this_week(&self, today: NaiveDate) -> Result<Vec<SessionRecord>> {
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        self.query_range(monday, today)
    }

    pub fn all_records(&self, today: NaiveDate) -> Result<Vec<SessionRecord>> {
        self.query_range(DateTime::UNIX_EPOCH.date_naive(), today)
    }

    pub fn daily_summary(&self, today: NaiveDate) -> Result<Rollup> {
        Ok(Rollup::from_records(&self.today(today)?, self.offset))
    }

    pub fn weekly_summary(&self, today: NaiveDate) -> Result<Rollup> {
        Ok(Rollup::from_records(&self.this_week(today)?, self.offset))
    }

    /// Re-read all history and evaluate progress against it.
    pub fn progress(&self, ctx: &EvaluationContext) -> Result<ProgressSnapshot> {
        Ok(evaluate(&self.all_records(ctx.today)?, ctx))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn create_with_retry(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let result = self.with_retry("create_record", || self.store.create_record(record));
        match result {
            Ok(_) => Ok(()),
            // The first attempt may have landed before failing to report.
            Err(StoreError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match op() {
            Ok(value) => Ok(value),
            Err(first) => {
                warn!(operation, error = %first, "store call failed, retrying once");
                op().map_err(|second| {
                    warn!(operation, error = %second, "store call failed after retry");
                    second
                })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRecord>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `round((ended_at - started_at) in minutes)`, never negative.
pub fn actual_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u32 {
    let secs = (ended_at - started_at).num_seconds().max(0);
    u32::try_from((secs + 30) / 60).unwrap_or(u32::MAX)
}

fn local_midnight_utc(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = day.and_time(NaiveTime::MIN);
    (local - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}
