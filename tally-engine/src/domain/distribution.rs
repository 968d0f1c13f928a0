//! Reallocation of a fixed time budget across a set of worklogs.
//!
//! Everything here is pure: a plan is computed from the inputs and returned
//! together with the previous durations so the caller can undo it. Applying a
//! plan is the caller's job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{
    models::{RecordId, WorklogRecord},
    ValidationError,
};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// How a target total is split across records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyKind {
    #[strum(ascii_case_insensitive, serialize = "equal")]
    Equal,
    #[strum(ascii_case_insensitive, serialize = "proportional")]
    Proportional,
    #[strum(ascii_case_insensitive, serialize = "weighted")]
    Weighted,
}

/// Relative effort for one record, as supplied by an external scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordWeight {
    pub record_id: RecordId,
    pub hours: f64,
}

impl RecordWeight {
    pub fn new(record_id: impl Into<RecordId>, hours: f64) -> Self {
        Self {
            record_id: record_id.into(),
            hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DistributionPolicy {
    Equal,
    Proportional,
    /// Weights may be partial; records without a weight get an equal share.
    Weighted(Vec<RecordWeight>),
}

impl DistributionPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            DistributionPolicy::Equal => PolicyKind::Equal,
            DistributionPolicy::Proportional => PolicyKind::Proportional,
            DistributionPolicy::Weighted(_) => PolicyKind::Weighted,
        }
    }
}

/// The planning input for one record. Order of records is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDuration {
    pub id: RecordId,
    pub current_seconds: i64,
}

impl RecordDuration {
    pub fn new(id: impl Into<RecordId>, current_seconds: i64) -> Self {
        Self {
            id: id.into(),
            current_seconds,
        }
    }
}

impl From<&WorklogRecord> for RecordDuration {
    fn from(record: &WorklogRecord) -> Self {
        Self {
            id: record.id.clone(),
            current_seconds: record.duration_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub record_id: RecordId,
    pub previous_seconds: i64,
    pub new_seconds: i64,
}

impl Assignment {
    pub fn is_change(&self) -> bool {
        self.previous_seconds != self.new_seconds
    }
}

/// A computed mapping from records to new durations.
///
/// For equal and proportional plans the new durations sum to exactly
/// `target_seconds` unless the floor pushed records above their share.
/// Weighted plans may be a few seconds off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionPlan {
    pub target_seconds: i64,
    pub policy: PolicyKind,
    pub assignments: Vec<Assignment>,
}

impl DistributionPlan {
    pub fn total_seconds(&self) -> i64 {
        self.assignments.iter().map(|a| a.new_seconds).sum()
    }

    pub fn is_exact(&self) -> bool {
        self.total_seconds() == self.target_seconds
    }

    pub fn get(&self, record_id: &RecordId) -> Option<&Assignment> {
        self.assignments.iter().find(|a| &a.record_id == record_id)
    }

    /// Assignments that actually move a record's duration.
    pub fn changes(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().filter(|a| a.is_change())
    }
}

/// Computes distribution plans. Holds only the configured floor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributionEngine {
    floor_seconds: i64,
}

impl DistributionEngine {
    pub fn new(floor_seconds: i64) -> Self {
        Self { floor_seconds }
    }

    pub fn floor_seconds(&self) -> i64 {
        self.floor_seconds
    }

    /// Plan a redistribution of `target_seconds` over `records`.
    ///
    /// When `records.len() * floor` exceeds the target, the floor wins and the
    /// plan overshoots the target. A weighted policy whose weights are unusable
    /// fails with [`ValidationError::InvalidWeights`]; callers fall back to
    /// [`DistributionPolicy::Proportional`].
    pub fn plan(
        &self,
        records: &[RecordDuration],
        target_seconds: i64,
        policy: &DistributionPolicy,
    ) -> Result<DistributionPlan, ValidationError> {
        if target_seconds <= 0 {
            return Err(ValidationError::NonPositiveTarget(target_seconds));
        }
        if self.floor_seconds < 0 {
            return Err(ValidationError::NegativeFloor(self.floor_seconds));
        }
        if records.is_empty() {
            return Err(ValidationError::NoRecords);
        }

        let floor = self.floor_seconds;
        if floor.saturating_mul(records.len() as i64) > target_seconds {
            tracing::warn!(
                floor,
                target_seconds,
                records = records.len(),
                "floor exceeds the per-record share, plan will overshoot the target"
            );
        }

        let values = match policy {
            DistributionPolicy::Equal => equal_split(records.len(), target_seconds)
                .into_iter()
                .map(|v| v.max(floor))
                .collect(),
            DistributionPolicy::Proportional => proportional_split(records, target_seconds, floor),
            DistributionPolicy::Weighted(weights) => {
                weighted_split(records, weights, target_seconds, floor)?
            }
        };

        let assignments = records
            .iter()
            .zip(values)
            .map(|(record, new_seconds)| Assignment {
                record_id: record.id.clone(),
                previous_seconds: record.current_seconds,
                new_seconds,
            })
            .collect();

        let plan = DistributionPlan {
            target_seconds,
            policy: policy.kind(),
            assignments,
        };
        tracing::debug!(
            policy = %plan.policy,
            target_seconds,
            total_seconds = plan.total_seconds(),
            "computed distribution plan"
        );
        Ok(plan)
    }
}

/// Split `target` into `n` integer parts; the first `target % n` get one extra second.
fn equal_split(n: usize, target: i64) -> Vec<i64> {
    let n = n as i64;
    let per = target / n;
    let remainder = target % n;
    (0..n)
        .map(|i| if i < remainder { per + 1 } else { per })
        .collect()
}

/// Scale current durations to the target. The last record absorbs the rounding residual.
fn proportional_split(records: &[RecordDuration], target: i64, floor: i64) -> Vec<i64> {
    let total: i64 = records.iter().map(|r| r.current_seconds).sum();
    if total == 0 {
        return equal_split(records.len(), target)
            .into_iter()
            .map(|v| v.max(floor))
            .collect();
    }

    let ratio = target as f64 / total as f64;
    let (last, init) = match records.split_last() {
        Some(split) => split,
        None => return Vec::new(),
    };

    let mut values: Vec<i64> = init
        .iter()
        .map(|r| ((r.current_seconds as f64 * ratio).round() as i64).max(floor))
        .collect();
    let assigned: i64 = values.iter().sum();
    let residual = target - assigned;
    if residual < floor {
        tracing::debug!(
            record_id = %last.id,
            residual,
            floor,
            "residual below floor, clamping last record"
        );
    }
    values.push(residual.max(floor));
    values
}

/// Scale externally supplied weights to the target. No residual correction.
fn weighted_split(
    records: &[RecordDuration],
    weights: &[RecordWeight],
    target: i64,
    floor: i64,
) -> Result<Vec<i64>, ValidationError> {
    let by_id: HashMap<&RecordId, f64> = weights.iter().map(|w| (&w.record_id, w.hours)).collect();
    let default_hours = target as f64 / records.len() as f64 / SECONDS_PER_HOUR;

    let weight_seconds: Vec<f64> = records
        .iter()
        .map(|r| by_id.get(&r.id).copied().unwrap_or(default_hours) * SECONDS_PER_HOUR)
        .collect();

    if let Some(bad) = weight_seconds.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(ValidationError::invalid_weights(format!(
            "weight must be a finite, non-negative number of hours, got {}",
            bad / SECONDS_PER_HOUR
        )));
    }

    let sum: f64 = weight_seconds.iter().sum();
    if sum <= 0.0 {
        return Err(ValidationError::invalid_weights("weights sum to zero"));
    }

    let ratio = target as f64 / sum;
    Ok(weight_seconds
        .into_iter()
        .map(|w| ((w * ratio).round() as i64).max(floor))
        .collect())
}
