//! Per-record undo/redo for interactive single-field edits.
//!
//! Each record owns a bounded list of snapshots, most recent first, and a
//! pointer into it. `-1` means the user is looking at the live, uncaptured
//! value; `n >= 0` means the record currently shows `entries[n]`. The live
//! value is only snapshotted on the first undo step, which is why stepping
//! back from live lands on index 1 rather than 0.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{
    models::{RecordId, WorklogRecord},
    Clock, StateError, SystemClock,
};

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

const LIVE: isize = -1;

/// The editable part of a worklog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableFields {
    pub comment: String,
    pub duration_seconds: i64,
}

impl EditableFields {
    pub fn new(comment: impl Into<String>, duration_seconds: i64) -> Self {
        Self {
            comment: comment.into(),
            duration_seconds,
        }
    }
}

impl From<&WorklogRecord> for EditableFields {
    fn from(record: &WorklogRecord) -> Self {
        Self {
            comment: record.comment.clone(),
            duration_seconds: record.duration_seconds,
        }
    }
}

/// Snapshot of one record's editable fields at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub comment: String,
    pub duration_seconds: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl HistoryEntry {
    fn capture(fields: &EditableFields, timestamp: OffsetDateTime) -> Self {
        Self {
            comment: fields.comment.clone(),
            duration_seconds: fields.duration_seconds,
            timestamp,
        }
    }

    pub fn fields(&self) -> EditableFields {
        EditableFields::new(self.comment.clone(), self.duration_seconds)
    }

    fn matches(&self, fields: &EditableFields) -> bool {
        self.comment == fields.comment && self.duration_seconds == fields.duration_seconds
    }
}

/// Where a commit comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Typed by the user; may be captured.
    User,
    /// The result of `undo`/`redo` being written back; never captured.
    HistoryStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryState {
    entries: VecDeque<HistoryEntry>,
    pointer: isize,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            pointer: LIVE,
        }
    }
}

impl HistoryState {
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pointer(&self) -> isize {
        self.pointer
    }

    pub fn is_live(&self) -> bool {
        self.pointer == LIVE
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.pointer < self.entries.len() as isize - 1
    }

    pub fn can_redo(&self) -> bool {
        self.pointer > LIVE
    }

    /// `(steps back, steps available)` for an "N/M" indicator, `None` when live.
    pub fn position(&self) -> Option<(usize, usize)> {
        if self.is_live() {
            None
        } else {
            Some((self.pointer as usize, self.entries.len().saturating_sub(1)))
        }
    }

    fn push_front(&mut self, entry: HistoryEntry, capacity: usize) {
        self.entries.push_front(entry);
        self.entries.truncate(capacity);
    }
}

/// Owns one [`HistoryState`] per record.
///
/// Mutated from a single logical thread; callers keep at most one in-flight
/// edit per record.
pub struct HistoryManager {
    states: HashMap<RecordId, HistoryState>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("records", &self.states.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl HistoryManager {
    /// `capacity` is clamped to at least 2 so that one undo step always fits
    /// next to the snapshot of the live value.
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: HashMap::new(),
            capacity: capacity.max(2),
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self, record_id: &RecordId) -> Option<&HistoryState> {
        self.states.get(record_id)
    }

    pub fn can_undo(&self, record_id: &RecordId) -> bool {
        self.state(record_id).is_some_and(HistoryState::can_undo)
    }

    pub fn can_redo(&self, record_id: &RecordId) -> bool {
        self.state(record_id).is_some_and(HistoryState::can_redo)
    }

    pub fn position(&self, record_id: &RecordId) -> Option<(usize, usize)> {
        self.state(record_id).and_then(HistoryState::position)
    }

    /// Snapshot `live` ahead of an edit that will write `next`.
    ///
    /// Nothing is captured when the edit does not change anything. If the user
    /// had stepped back, the snapshots newer than the current one are dropped
    /// first, so redo can no longer reach them. Returns whether a snapshot was
    /// stored.
    pub fn capture_before_edit(
        &mut self,
        record_id: &RecordId,
        live: &EditableFields,
        next: &EditableFields,
    ) -> bool {
        if live == next {
            return false;
        }

        let capacity = self.capacity;
        let timestamp = self.clock.now();
        let state = self.states.entry(record_id.clone()).or_default();

        if state.pointer > LIVE {
            let newer = state.pointer as usize;
            state.entries.drain(..newer);
            state.pointer = LIVE;
            tracing::debug!(record_id = %record_id, dropped = newer, "edit truncated redo branch");
        }

        if state.entries.front().is_some_and(|e| e.matches(live)) {
            return false;
        }

        state.push_front(HistoryEntry::capture(live, timestamp), capacity);
        true
    }

    /// The commit path for an edit. Writes coming back from `undo`/`redo` are
    /// excluded so stepping through history never grows it.
    pub fn commit_edit(
        &mut self,
        record_id: &RecordId,
        live: &EditableFields,
        next: &EditableFields,
        origin: EditOrigin,
    ) -> bool {
        match origin {
            EditOrigin::User => self.capture_before_edit(record_id, live, next),
            EditOrigin::HistoryStep => false,
        }
    }

    /// Step one snapshot back. `live` is what the record shows right now.
    ///
    /// The returned entry must be written back with [`EditOrigin::HistoryStep`].
    pub fn undo(
        &mut self,
        record_id: &RecordId,
        live: &EditableFields,
    ) -> Result<HistoryEntry, StateError> {
        let capacity = self.capacity;
        let timestamp = self.clock.now();
        let state = self
            .states
            .get_mut(record_id)
            .filter(|s| s.can_undo())
            .ok_or(StateError::NothingToUndo)?;

        if state.pointer == LIVE {
            let already_captured = state.entries.front().is_some_and(|e| e.matches(live));
            if !already_captured {
                state.push_front(HistoryEntry::capture(live, timestamp), capacity);
            } else if state.entries.len() < 2 {
                return Err(StateError::NothingToUndo);
            }
            state.pointer = 1;
        } else {
            state.pointer += 1;
        }

        state
            .entries
            .get(state.pointer as usize)
            .cloned()
            .ok_or(StateError::NothingToUndo)
    }

    /// Step one snapshot forward, returning to live after the newest snapshot.
    pub fn redo(&mut self, record_id: &RecordId) -> Result<HistoryEntry, StateError> {
        let state = self
            .states
            .get_mut(record_id)
            .filter(|s| s.can_redo())
            .ok_or(StateError::NothingToRedo)?;

        if state.pointer - 1 == LIVE {
            state.pointer = LIVE;
            return state.entries.front().cloned().ok_or(StateError::NothingToRedo);
        }

        state.pointer -= 1;
        state
            .entries
            .get(state.pointer as usize)
            .cloned()
            .ok_or(StateError::NothingToRedo)
    }

    /// Drop all history for a record, e.g. after it was deleted.
    pub fn forget(&mut self, record_id: &RecordId) {
        self.states.remove(record_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ManualClock;
    use time::{macros::datetime, Duration};

    fn manager(capacity: usize) -> (HistoryManager, ManualClock) {
        let clock = ManualClock::new(datetime!(2024-03-04 09:00 UTC));
        (HistoryManager::new(capacity, Arc::new(clock.clone())), clock)
    }

    fn fields(comment: &str, minutes: i64) -> EditableFields {
        EditableFields::new(comment, minutes * 60)
    }

    /// Simulates the UI: commit a user edit and return the new live value.
    fn edit(
        history: &mut HistoryManager,
        id: &RecordId,
        live: &EditableFields,
        next: EditableFields,
    ) -> EditableFields {
        history.commit_edit(id, live, &next, EditOrigin::User);
        next
    }

    #[test]
    fn undo_twice_then_redo_twice_returns_to_latest_edit() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");
        let v0 = fields("draft", 30);
        let v1 = fields("draft, reviewed", 30);
        let v2 = fields("draft, reviewed", 45);

        let live = edit(&mut history, &id, &v0, v1.clone());
        let live = edit(&mut history, &id, &live, v2.clone());

        let back = history.undo(&id, &live).unwrap().fields();
        assert_eq!(back, v1);
        history.commit_edit(&id, &live, &back, EditOrigin::HistoryStep);
        let back2 = history.undo(&id, &back).unwrap().fields();
        assert_eq!(back2, v0);
        assert!(!history.can_undo(&id));

        assert_eq!(history.redo(&id).unwrap().fields(), v1);
        assert_eq!(history.redo(&id).unwrap().fields(), v2);
        assert_eq!(history.state(&id).unwrap().len(), 3);
    }

    #[test]
    fn first_undo_snapshots_live_value_and_lands_on_index_one() {
        let (mut history, clock) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");
        let live = edit(&mut history, &id, &fields("a", 10), fields("b", 10));
        assert_eq!(history.state(&id).unwrap().len(), 1);

        clock.advance(Duration::minutes(5));
        let restored = history.undo(&id, &live).unwrap();
        let state = history.state(&id).unwrap();

        assert_eq!(restored.fields(), fields("a", 10));
        assert_eq!(state.pointer(), 1);
        assert_eq!(state.len(), 2);
        let newest = state.entries().next().unwrap();
        assert_eq!(newest.fields(), live);
        assert_eq!(newest.timestamp, datetime!(2024-03-04 09:05 UTC));
        assert_eq!(history.position(&id), Some((1, 1)));
    }

    #[test]
    fn redo_from_newest_snapshot_returns_to_live() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");
        let live = edit(&mut history, &id, &fields("a", 10), fields("b", 10));

        history.undo(&id, &live).unwrap();
        assert_eq!(history.redo(&id).unwrap().fields(), live);
        assert_eq!(history.state(&id).unwrap().pointer(), 0);
        assert!(history.can_redo(&id));

        assert_eq!(history.redo(&id).unwrap().fields(), live);
        assert!(history.state(&id).unwrap().is_live());
        assert_eq!(history.redo(&id), Err(StateError::NothingToRedo));

        // Undoing again reuses the snapshot taken on the first undo
        assert_eq!(history.undo(&id, &live).unwrap().fields(), fields("a", 10));
        assert_eq!(history.state(&id).unwrap().len(), 2);
    }

    #[test]
    fn new_edit_after_undo_discards_redo_branch() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");
        let v0 = fields("v0", 60);
        let v2 = fields("v2", 60);

        let live = edit(&mut history, &id, &v0, fields("v1", 60));
        let live = edit(&mut history, &id, &live, v2.clone());
        let back = history.undo(&id, &live).unwrap().fields();

        let live = edit(&mut history, &id, &back, fields("v3", 60));
        assert!(!history.can_redo(&id));
        assert!(history.state(&id).unwrap().entries().all(|e| e.fields() != v2));

        assert_eq!(history.undo(&id, &live).unwrap().fields(), fields("v1", 60));
        assert_eq!(history.redo(&id).unwrap().fields(), fields("v3", 60));
    }

    #[test]
    fn unchanged_edit_is_not_captured() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");

        assert!(!history.capture_before_edit(&id, &fields("a", 1), &fields("a", 1)));
        assert!(history.state(&id).is_none());
        assert!(!history.can_undo(&id));
    }

    #[test]
    fn history_steps_are_not_captured() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");

        assert!(!history.commit_edit(&id, &fields("a", 1), &fields("b", 1), EditOrigin::HistoryStep));
        assert!(history.state(&id).is_none());
    }

    #[test]
    fn capacity_drops_oldest_snapshots() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");

        let mut live = fields("edit", 0);
        for minutes in 1..=25 {
            live = edit(&mut history, &id, &live, fields("edit", minutes));
        }

        let state = history.state(&id).unwrap();
        assert_eq!(state.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(state.entries().next().unwrap().duration_seconds, 24 * 60);
        assert_eq!(state.entries().last().unwrap().duration_seconds, 5 * 60);

        // Undo all the way back stays within bounds
        let mut steps = 0;
        let mut current = live;
        while history.can_undo(&id) {
            current = history.undo(&id, &current).unwrap().fields();
            steps += 1;
        }
        assert_eq!(steps, DEFAULT_HISTORY_CAPACITY - 1);
        assert_eq!(current, fields("edit", 6));
    }

    #[test]
    fn undo_and_redo_without_history_are_not_applicable() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let id = RecordId::new("wl-1");

        assert_eq!(history.undo(&id, &fields("a", 1)), Err(StateError::NothingToUndo));
        assert_eq!(history.redo(&id), Err(StateError::NothingToRedo));
    }

    #[test]
    fn histories_are_independent_per_record() {
        let (mut history, _) = manager(DEFAULT_HISTORY_CAPACITY);
        let first = RecordId::new("wl-1");
        let second = RecordId::new("wl-2");

        edit(&mut history, &first, &fields("a", 1), fields("b", 1));
        assert!(history.can_undo(&first));
        assert!(!history.can_undo(&second));

        history.forget(&first);
        assert!(!history.can_undo(&first));
    }
}
