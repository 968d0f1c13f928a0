use async_trait::async_trait;
use time::Date;

use crate::domain::{
    models::{IssueKey, NewWorklog, RecordId, RecordRef, WorklogRecord, WorklogUpdate},
    StoreError,
};

/// Outbound port for the issue tracker holding the worklogs.
///
/// The tracker is the source of truth. Every call may fail with a transport
/// or remote error; the engine never retries on its own.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Get all worklogs logged on a date.
    async fn fetch(&self, date: Date) -> Result<Vec<WorklogRecord>, StoreError>;

    /// Create a worklog and return it as stored, including its new id.
    async fn create(&self, worklog: &NewWorklog) -> Result<WorklogRecord, StoreError>;

    /// Update the comment and/or duration of an existing worklog.
    async fn update(&self, target: &RecordRef, update: &WorklogUpdate) -> Result<(), StoreError>;

    /// Delete a worklog. Fails with [`StoreError::NotFound`] if it is already gone.
    async fn delete(&self, issue_key: &IssueKey, record_id: &RecordId) -> Result<(), StoreError>;
}
