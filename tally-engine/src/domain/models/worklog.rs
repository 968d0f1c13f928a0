use serde::{Deserialize, Serialize};
use time::Date;

use super::{IssueKey, RecordId};

/// One logged duration-plus-comment entry against a tracked work item.
///
/// The tracker is the source of truth; the engine only holds transient copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogRecord {
    pub id: RecordId,
    pub issue_key: IssueKey,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub comment: String,
    pub duration_seconds: i64,
    pub date: Date,
}

impl WorklogRecord {
    pub fn new(
        id: impl Into<RecordId>,
        issue_key: impl Into<IssueKey>,
        duration_seconds: i64,
        date: Date,
    ) -> Self {
        Self {
            id: id.into(),
            issue_key: issue_key.into(),
            summary: String::new(),
            comment: String::new(),
            duration_seconds,
            date,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn reference(&self) -> RecordRef {
        RecordRef {
            id: self.id.clone(),
            issue_key: self.issue_key.clone(),
        }
    }

    pub fn hours(&self) -> f64 {
        self.duration_seconds as f64 / 3600.0
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &WorklogUpdate) {
        if let Some(comment) = &update.comment {
            self.comment.clone_from(comment);
        }
        if let Some(seconds) = update.duration_seconds {
            self.duration_seconds = seconds;
        }
    }
}

/// Addresses a single worklog in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub id: RecordId,
    pub issue_key: IssueKey,
}

/// Request to create a new worklog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorklog {
    pub issue_key: IssueKey,
    pub date: Date,
    pub duration_seconds: i64,
    #[serde(default)]
    pub comment: String,
}

impl NewWorklog {
    pub fn new(issue_key: impl Into<IssueKey>, date: Date, duration_seconds: i64) -> Self {
        Self {
            issue_key: issue_key.into(),
            date,
            duration_seconds,
            comment: String::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Partial update of a worklog's editable fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

impl WorklogUpdate {
    pub fn duration(seconds: i64) -> Self {
        Self {
            comment: None,
            duration_seconds: Some(seconds),
        }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            duration_seconds: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.comment.is_none() && self.duration_seconds.is_none()
    }
}
