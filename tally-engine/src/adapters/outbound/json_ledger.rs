use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::{
    ports::outbound::LedgerStore, Clock, LedgerEntry, PersistenceError, SystemClock,
    DEFAULT_LEDGER_CAPACITY,
};

pub const DEFAULT_LEDGER_RETENTION_DAYS: i64 = 7;

/// Persists the ledger as a pretty-printed JSON array, newest first.
#[derive(Clone)]
pub struct JsonFileLedgerStore {
    path: PathBuf,
    retention: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JsonFileLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileLedgerStore")
            .field("path", &self.path)
            .field("retention", &self.retention)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl JsonFileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retention: Duration::days(DEFAULT_LEDGER_RETENTION_DAYS),
            capacity: DEFAULT_LEDGER_CAPACITY,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn load(&self) -> Result<Vec<LedgerEntry>, PersistenceError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&self.path).await?;
        if raw.trim().is_empty() {
            warn!("Ledger file {} is empty, starting fresh", self.path.display());
            return Ok(Vec::new());
        }

        let mut entries: Vec<LedgerEntry> = serde_json::from_str(&raw)?;
        let loaded = entries.len();
        let cutoff = self.clock.now() - self.retention;
        entries.retain(|e| e.timestamp >= cutoff);
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(self.capacity);

        if entries.len() < loaded {
            info!(
                "Pruned {} ledger entries older than {} days",
                loaded - entries.len(),
                self.retention.whole_days()
            );
        }
        Ok(entries)
    }

    async fn save(&self, entries: &[LedgerEntry]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedgerKind, ManualClock, UndoAction, UpdatedItem};
    use time::macros::datetime;

    fn entry(title: &str, at: time::OffsetDateTime) -> LedgerEntry {
        LedgerEntry::new(title, "msg", LedgerKind::Success, at)
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLedgerStore::new(dir.path().join("ledger.json"));

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_prunes_old_entries_and_keeps_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(datetime!(2024-03-10 12:00 UTC));
        let store = JsonFileLedgerStore::new(dir.path().join("nested").join("ledger.json"))
            .with_clock(Arc::new(clock));

        let recent = entry("recent", datetime!(2024-03-09 08:00 UTC)).with_undo(
            UndoAction::updated(vec![UpdatedItem::new("1", "PROJ-1").with_previous_seconds(60)]),
        );
        let older = entry("older", datetime!(2024-03-05 08:00 UTC));
        let stale = entry("stale", datetime!(2024-03-01 08:00 UTC));
        store
            .save(&[older.clone(), stale, recent.clone()])
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, vec![recent, older]);
    }

    #[tokio::test]
    async fn load_caps_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(datetime!(2024-03-10 12:00 UTC));
        let store = JsonFileLedgerStore::new(dir.path().join("ledger.json"))
            .with_clock(Arc::new(clock))
            .with_capacity(2);

        let entries: Vec<_> = (0..4)
            .map(|i| entry(&format!("e{i}"), datetime!(2024-03-10 08:00 UTC) - Duration::hours(i)))
            .collect();
        store.save(&entries).await.unwrap();

        let titles: Vec<_> = store.load().await.unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["e0", "e1"]);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileLedgerStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Serde(_)));
    }
}
