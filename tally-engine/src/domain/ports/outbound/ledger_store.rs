use async_trait::async_trait;

use crate::domain::{LedgerEntry, PersistenceError};

/// Outbound port for persisting the action ledger between sessions.
///
/// Entries are exchanged newest first. Implementations drop entries past the
/// retention window when loading.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn load(&self) -> Result<Vec<LedgerEntry>, PersistenceError>;

    async fn save(&self, entries: &[LedgerEntry]) -> Result<(), PersistenceError>;
}
