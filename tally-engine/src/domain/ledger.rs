//! Ledger of completed mutations, each optionally carrying the descriptor
//! needed to reverse it.
//!
//! Entries are kept newest first and capped. An entry is dismissed exactly
//! once, when its undo action has been applied in full; it is never revived.

use std::collections::VecDeque;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;

use super::{
    models::{IssueKey, LedgerEntryId, RecordId, RecordRef, WorklogUpdate},
    ports::outbound::RecordStore,
    EngineError, StateError, StoreError,
};

pub const DEFAULT_LEDGER_CAPACITY: usize = 100;

/// Presentation kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LedgerKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedItem {
    pub record_id: RecordId,
    pub issue_key: IssueKey,
}

impl CreatedItem {
    pub fn new(record_id: impl Into<RecordId>, issue_key: impl Into<IssueKey>) -> Self {
        Self {
            record_id: record_id.into(),
            issue_key: issue_key.into(),
        }
    }
}

/// The values a record had before an update. Only fields the update touched are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedItem {
    pub record_id: RecordId,
    pub issue_key: IssueKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_seconds: Option<i64>,
}

impl UpdatedItem {
    pub fn new(record_id: impl Into<RecordId>, issue_key: impl Into<IssueKey>) -> Self {
        Self {
            record_id: record_id.into(),
            issue_key: issue_key.into(),
            previous_comment: None,
            previous_seconds: None,
        }
    }

    pub fn with_previous_comment(mut self, comment: impl Into<String>) -> Self {
        self.previous_comment = Some(comment.into());
        self
    }

    pub fn with_previous_seconds(mut self, seconds: i64) -> Self {
        self.previous_seconds = Some(seconds);
        self
    }

    fn restore(&self) -> WorklogUpdate {
        WorklogUpdate {
            comment: self.previous_comment.clone(),
            duration_seconds: self.previous_seconds,
        }
    }
}

/// Describes how to get back to the state before a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UndoAction {
    Create { items: Vec<CreatedItem> },
    Update { items: Vec<UpdatedItem> },
    BatchUpdate { items: Vec<UpdatedItem> },
    BatchCreate { items: Vec<CreatedItem> },
}

impl UndoAction {
    /// `Create` for a single item, `BatchCreate` otherwise.
    pub fn created(items: Vec<CreatedItem>) -> Self {
        if items.len() == 1 {
            UndoAction::Create { items }
        } else {
            UndoAction::BatchCreate { items }
        }
    }

    /// `Update` for a single item, `BatchUpdate` otherwise.
    pub fn updated(items: Vec<UpdatedItem>) -> Self {
        if items.len() == 1 {
            UndoAction::Update { items }
        } else {
            UndoAction::BatchUpdate { items }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UndoAction::Create { items } | UndoAction::BatchCreate { items } => items.len(),
            UndoAction::Update { items } | UndoAction::BatchUpdate { items } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn inverse(&self) -> Vec<InverseOp> {
        match self {
            UndoAction::Create { items } | UndoAction::BatchCreate { items } => items
                .iter()
                .map(|item| InverseOp::Delete {
                    issue_key: item.issue_key.clone(),
                    record_id: item.record_id.clone(),
                })
                .collect(),
            UndoAction::Update { items } | UndoAction::BatchUpdate { items } => items
                .iter()
                .map(|item| InverseOp::Restore {
                    target: RecordRef {
                        id: item.record_id.clone(),
                        issue_key: item.issue_key.clone(),
                    },
                    update: item.restore(),
                })
                .collect(),
        }
    }
}

enum InverseOp {
    Delete {
        issue_key: IssueKey,
        record_id: RecordId,
    },
    Restore {
        target: RecordRef,
        update: WorklogUpdate,
    },
}

enum InverseOutcome {
    Reversed,
    /// Already in the reversed state, e.g. deleted by an earlier partial attempt.
    Skipped,
}

impl InverseOp {
    async fn apply<S: RecordStore + ?Sized>(&self, store: &S) -> Result<InverseOutcome, StoreError> {
        match self {
            InverseOp::Delete {
                issue_key,
                record_id,
            } => match store.delete(issue_key, record_id).await {
                Ok(()) => Ok(InverseOutcome::Reversed),
                Err(e) if e.is_not_found() => Ok(InverseOutcome::Skipped),
                Err(e) => Err(e),
            },
            InverseOp::Restore { update, .. } if update.is_empty() => Ok(InverseOutcome::Skipped),
            InverseOp::Restore { target, update } => {
                store.update(target, update).await?;
                Ok(InverseOutcome::Reversed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDiff {
    pub before: String,
    pub after: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<IssueKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub title: String,
    pub message: String,
    pub kind: LedgerKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_action: Option<UndoAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ChangeDiff>,
    #[serde(default)]
    pub dismissed: bool,
}

impl LedgerEntry {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        kind: LedgerKind,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            title: title.into(),
            message: message.into(),
            kind,
            timestamp,
            undo_action: None,
            diff: None,
            dismissed: false,
        }
    }

    pub fn with_undo(mut self, action: UndoAction) -> Self {
        self.undo_action = Some(action);
        self
    }

    pub fn with_diff(mut self, diff: ChangeDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn is_undoable(&self) -> bool {
        !self.dismissed && self.undo_action.is_some()
    }
}

/// Result of a fully applied undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoReport {
    pub entry: LedgerEntryId,
    pub reversed: usize,
    pub skipped: usize,
}

/// Bounded, newest-first list of past mutations.
#[derive(Debug, Clone)]
pub struct ActionLedger {
    entries: VecDeque<LedgerEntry>,
    capacity: usize,
}

impl Default for ActionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

impl ActionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild a ledger from persisted entries, given newest first.
    pub fn from_entries(entries: Vec<LedgerEntry>, capacity: usize) -> Self {
        let mut ledger = Self::new(capacity);
        ledger.entries = entries.into();
        ledger.entries.truncate(ledger.capacity);
        ledger
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &LedgerEntryId) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Entries newest first, for persistence.
    pub fn to_vec(&self) -> Vec<LedgerEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Add a completed mutation at the front, evicting the oldest past capacity.
    pub fn record(&mut self, entry: LedgerEntry) -> LedgerEntryId {
        let id = entry.id;
        tracing::debug!(entry = %id, title = %entry.title, kind = %entry.kind, "ledger entry recorded");
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        id
    }

    /// Reverse the mutation behind `id` through `store`.
    ///
    /// All inverse operations are issued concurrently. When any of them fails
    /// the ones that succeeded stay reversed, the entry stays undoable and the
    /// error is returned; retrying is safe because deletes of missing records
    /// are skipped and restores are idempotent.
    pub async fn apply_undo<S: RecordStore + ?Sized>(
        &mut self,
        id: LedgerEntryId,
        store: &S,
    ) -> Result<UndoReport, EngineError> {
        let entry = self.get(&id).ok_or(StateError::EntryNotFound(id))?;
        let action = match (&entry.undo_action, entry.dismissed) {
            (Some(action), false) => action.clone(),
            _ => return Err(StateError::AlreadyAppliedOrNotUndoable(id).into()),
        };

        let ops = action.inverse();
        let total = ops.len();
        let results = join_all(ops.iter().map(|op| op.apply(store))).await;

        let mut reversed = 0;
        let mut skipped = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(InverseOutcome::Reversed) => reversed += 1,
                Ok(InverseOutcome::Skipped) => skipped += 1,
                Err(e) => {
                    tracing::warn!(entry = %id, error = %e, "inverse operation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(source) = first_error {
            return Err(EngineError::UndoIncomplete {
                entry: id,
                reversed: reversed + skipped,
                total,
                source,
            });
        }

        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.dismissed = true;
        }
        tracing::info!(entry = %id, reversed, skipped, "undo applied");

        Ok(UndoReport {
            entry: id,
            reversed,
            skipped,
        })
    }

    /// Remove every entry. Irreversible.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::InMemoryRecordStore;
    use crate::domain::models::WorklogRecord;
    use time::macros::{date, datetime};

    fn entry(title: &str) -> LedgerEntry {
        LedgerEntry::new(title, "", LedgerKind::Info, datetime!(2024-03-04 09:00 UTC))
    }

    fn store() -> InMemoryRecordStore {
        InMemoryRecordStore::with_records(vec![
            WorklogRecord::new("1", "PROJ-1", 3_600, date!(2024 - 03 - 04)).with_comment("standup"),
            WorklogRecord::new("2", "PROJ-2", 7_200, date!(2024 - 03 - 04)).with_comment("review"),
        ])
    }

    fn rebalance_entry() -> LedgerEntry {
        entry("Rebalanced").with_undo(UndoAction::updated(vec![
            UpdatedItem::new("1", "PROJ-1").with_previous_seconds(1_800),
            UpdatedItem::new("2", "PROJ-2")
                .with_previous_seconds(5_400)
                .with_previous_comment("code review"),
        ]))
    }

    #[test]
    fn record_keeps_newest_first_and_caps_at_capacity() {
        let mut ledger = ActionLedger::default();
        for i in 0..=DEFAULT_LEDGER_CAPACITY {
            ledger.record(entry(&format!("entry {i}")));
        }

        assert_eq!(ledger.len(), DEFAULT_LEDGER_CAPACITY);
        assert_eq!(ledger.entries().next().unwrap().title, "entry 100");
        assert_eq!(ledger.entries().last().unwrap().title, "entry 1");
        assert!(ledger.entries().all(|e| e.title != "entry 0"));
    }

    #[tokio::test]
    async fn undo_applies_once_then_reports_not_applicable() {
        let store = store();
        let mut ledger = ActionLedger::default();
        let id = ledger.record(rebalance_entry());

        let report = ledger.apply_undo(id, &store).await.unwrap();
        assert_eq!(report.reversed, 2);
        assert!(ledger.get(&id).unwrap().dismissed);
        assert_eq!(store.get(&RecordId::new("1")).unwrap().duration_seconds, 1_800);
        let second = store.get(&RecordId::new("2")).unwrap();
        assert_eq!(second.duration_seconds, 5_400);
        assert_eq!(second.comment, "code review");

        let again = ledger.apply_undo(id, &store).await;
        assert!(matches!(
            again,
            Err(EngineError::State(StateError::AlreadyAppliedOrNotUndoable(e))) if e == id
        ));
        assert_eq!(store.update_calls(), 2);
    }

    #[tokio::test]
    async fn entries_without_undo_action_are_not_undoable() {
        let store = store();
        let mut ledger = ActionLedger::default();
        let id = ledger.record(entry("Copied comment"));

        assert!(!ledger.get(&id).unwrap().is_undoable());
        assert!(matches!(
            ledger.apply_undo(id, &store).await,
            Err(EngineError::State(StateError::AlreadyAppliedOrNotUndoable(_)))
        ));

        let unknown = LedgerEntryId::generate();
        assert!(matches!(
            ledger.apply_undo(unknown, &store).await,
            Err(EngineError::State(StateError::EntryNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn undo_of_create_deletes_and_skips_already_deleted() {
        let store = store();
        let mut ledger = ActionLedger::default();
        let id = ledger.record(entry("Created").with_undo(UndoAction::created(vec![
            CreatedItem::new("1", "PROJ-1"),
            CreatedItem::new("gone", "PROJ-9"),
        ])));

        let report = ledger.apply_undo(id, &store).await.unwrap();
        assert_eq!(report.reversed, 1);
        assert_eq!(report.skipped, 1);
        assert!(store.get(&RecordId::new("1")).is_none());
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn partial_failure_keeps_entry_undoable_for_retry() {
        let store = store();
        store.fail_for(&RecordId::new("2"));
        let mut ledger = ActionLedger::default();
        let id = ledger.record(rebalance_entry());

        let err = ledger.apply_undo(id, &store).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::UndoIncomplete {
                reversed: 1,
                total: 2,
                ..
            }
        ));
        assert!(!ledger.get(&id).unwrap().dismissed);
        // Already reversed record stays reversed
        assert_eq!(store.get(&RecordId::new("1")).unwrap().duration_seconds, 1_800);

        store.recover(&RecordId::new("2"));
        let report = ledger.apply_undo(id, &store).await.unwrap();
        assert_eq!(report.reversed, 2);
        assert!(ledger.get(&id).unwrap().dismissed);
        assert_eq!(store.get(&RecordId::new("2")).unwrap().duration_seconds, 5_400);
    }

    #[test]
    fn clear_empties_the_ledger() {
        let mut ledger = ActionLedger::default();
        ledger.record(entry("a"));
        ledger.record(entry("b"));

        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn from_entries_caps_persisted_entries() {
        let entries: Vec<_> = (0..5).map(|i| entry(&format!("entry {i}"))).collect();
        let ledger = ActionLedger::from_entries(entries, 3);

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.entries().next().unwrap().title, "entry 0");
    }

    #[test]
    fn undo_action_is_tagged_by_type() {
        let action = UndoAction::created(vec![
            CreatedItem::new("1", "PROJ-1"),
            CreatedItem::new("2", "PROJ-2"),
        ]);
        let json = serde_json::to_value(&action).unwrap();

        assert_eq!(json["type"], "BATCH_CREATE");
        assert_eq!(json["items"][1]["issueKey"], "PROJ-2");
        assert_eq!(
            serde_json::from_value::<UndoAction>(json).unwrap(),
            action
        );
    }
}
