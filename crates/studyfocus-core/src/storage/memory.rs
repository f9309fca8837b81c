//! In-process [`SessionStore`] for tests and ephemeral hosts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::store::{SessionRecord, SessionStore, SessionUpdate};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, SessionRecord>>,
    fail_next: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of store calls seen so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.lock().get(id).cloned()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, SessionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Unavailable("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

impl SessionStore for MemoryStore {
    fn create_record(&self, record: &SessionRecord) -> Result<String, StoreError> {
        self.check_available()?;
        let mut records = self.lock();
        if records.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(record.id.clone())
    }

    fn update_record(&self, id: &str, update: &SessionUpdate) -> Result<SessionRecord, StoreError> {
        self.check_available()?;
        let mut records = self.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply(record);
        Ok(record.clone())
    }

    fn query_by_date_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        self.check_available()?;
        let mut found: Vec<SessionRecord> = self
            .lock()
            .values()
            .filter(|r| r.user_id == user_id && r.started_at >= start && r.started_at <= end)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ModeId;

    fn record(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            user_id: "u".into(),
            mode: ModeId::ShortBurst,
            planned_min: 15,
            actual_min: None,
            started_at: Utc::now(),
            ended_at: None,
            completed: false,
            task_label: None,
        }
    }

    #[test]
    fn injected_failures_run_out() {
        let store = MemoryStore::new();
        store.fail_next(2);
        assert!(store.create_record(&record("a")).is_err());
        assert!(store.create_record(&record("a")).is_err());
        assert!(store.create_record(&record("a")).is_ok());
        assert_eq!(store.call_count(), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn conflict_on_duplicate() {
        let store = MemoryStore::new();
        store.create_record(&record("a")).unwrap();
        assert_eq!(
            store.create_record(&record("a")),
            Err(StoreError::Conflict("a".into()))
        );
    }
}
