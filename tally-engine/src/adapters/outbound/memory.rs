//! In-process record store, used for tests and for driving the engine
//! against a local JSON file.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::Date;

use crate::domain::{
    models::{IssueKey, NewWorklog, RecordId, RecordRef, WorklogRecord, WorklogUpdate},
    ports::outbound::RecordStore,
    StoreError,
};

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<WorklogRecord>,
    next_id: u64,
    failing: HashSet<RecordId>,
    offline: bool,
    update_calls: usize,
}

impl StoreState {
    fn check_reachable(&self, record_id: Option<&RecordId>) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Transport("store is offline".to_string()));
        }
        if let Some(id) = record_id.filter(|id| self.failing.contains(*id)) {
            return Err(StoreError::remote(format!("simulated failure for {id}")));
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> RecordId {
        loop {
            self.next_id += 1;
            let candidate = RecordId::new(format!("mem-{}", self.next_id));
            if !self.records.iter().any(|r| r.id == candidate) {
                return candidate;
            }
        }
    }
}

/// A [`RecordStore`] backed by a vector, with failure injection.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<WorklogRecord>) -> Self {
        let store = Self::new();
        store.lock().records = records;
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of all records in insertion order.
    pub fn records(&self) -> Vec<WorklogRecord> {
        self.lock().records.clone()
    }

    pub fn get(&self, record_id: &RecordId) -> Option<WorklogRecord> {
        self.lock().records.iter().find(|r| &r.id == record_id).cloned()
    }

    /// Make every update/delete of `record_id` fail with a remote error.
    pub fn fail_for(&self, record_id: &RecordId) {
        self.lock().failing.insert(record_id.clone());
    }

    pub fn recover(&self, record_id: &RecordId) {
        self.lock().failing.remove(record_id);
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of `update` calls received, failed ones included.
    pub fn update_calls(&self) -> usize {
        self.lock().update_calls
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch(&self, date: Date) -> Result<Vec<WorklogRecord>, StoreError> {
        let state = self.lock();
        state.check_reachable(None)?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect())
    }

    async fn create(&self, worklog: &NewWorklog) -> Result<WorklogRecord, StoreError> {
        let mut state = self.lock();
        state.check_reachable(None)?;
        let record = WorklogRecord {
            id: state.allocate_id(),
            issue_key: worklog.issue_key.clone(),
            summary: String::new(),
            comment: worklog.comment.clone(),
            duration_seconds: worklog.duration_seconds,
            date: worklog.date,
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, target: &RecordRef, update: &WorklogUpdate) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.update_calls += 1;
        state.check_reachable(Some(&target.id))?;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == target.id)
            .ok_or_else(|| StoreError::NotFound(target.id.clone()))?;
        record.apply(update);
        Ok(())
    }

    async fn delete(&self, _issue_key: &IssueKey, record_id: &RecordId) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check_reachable(Some(record_id))?;
        let before = state.records.len();
        state.records.retain(|r| &r.id != record_id);
        if state.records.len() == before {
            return Err(StoreError::NotFound(record_id.clone()));
        }
        Ok(())
    }
}
