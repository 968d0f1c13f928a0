use thiserror::Error;

use super::models::{LedgerEntryId, RecordId};

/// Input that the engine refuses to work with.
///
/// Recovered locally by callers: a malformed weight payload degrades the
/// weighted policy to proportional, a malformed duration keeps the prior value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("target must be a positive number of seconds, got {0}")]
    NonPositiveTarget(i64),
    #[error("floor must not be negative, got {0}")]
    NegativeFloor(i64),
    #[error("no worklogs to distribute over")]
    NoRecords,
    #[error("invalid weight payload: {0}")]
    InvalidWeights(String),
    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),
}

impl ValidationError {
    pub fn invalid_weights(msg: impl Into<String>) -> Self {
        Self::InvalidWeights(msg.into())
    }
}

/// Failures reported by the record store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("worklog not found: {0}")]
    NotFound(RecordId),
    #[error("remote rejected the request: {0}")]
    Remote(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// An operation that does not apply to the current state. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("ledger entry {0} was already applied or cannot be undone")]
    AlreadyAppliedOrNotUndoable(LedgerEntryId),
    #[error("ledger entry not found: {0}")]
    EntryNotFound(LedgerEntryId),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("no weight generator configured")]
    Unavailable,
    #[error("weight generation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access ledger file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize ledger: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Umbrella error for engine operations that cross component boundaries.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("{applied} of {total} worklogs applied, {pending} still pending")]
    BatchIncomplete {
        applied: usize,
        total: usize,
        pending: usize,
    },
    #[error("undo of {entry} incomplete: {reversed} of {total} reversed: {source}")]
    UndoIncomplete {
        entry: LedgerEntryId,
        reversed: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
}
