use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use time::Date;
use tracing::{info, instrument, warn};

use crate::domain::{
    format_duration,
    models::{IssueKey, LedgerEntryId, NewWorklog, RecordId, WorklogRecord, WorklogUpdate},
    parse_weight_payload,
    ports::outbound::{RecordStore, WeightGenerator},
    ActionLedger, ChangeDiff, Clock, CreatedItem, DistributionEngine, DistributionPlan,
    DistributionPolicy, EditOrigin, EditableFields, EngineError, HistoryManager, LedgerEntry,
    LedgerKind, PolicyKind, RecordDuration, StoreError, SystemClock, UndoAction, UndoReport,
    UpdatedItem, ValidationError,
};

/// Why a weighted plan was computed proportionally instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NoGenerator,
    GeneratorFailed(String),
    InvalidPayload(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoGenerator => write!(f, "no weight generator configured"),
            FallbackReason::GeneratorFailed(e) | FallbackReason::InvalidPayload(e) => {
                write!(f, "{e}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedRebalance {
    pub records: Vec<WorklogRecord>,
    pub plan: DistributionPlan,
    /// Set when a weighted request degraded to proportional.
    pub fallback: Option<FallbackReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub record_id: RecordId,
    pub error: StoreError,
}

/// Outcome of applying a plan. Writes that succeeded are never rolled back.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub total: usize,
    pub applied: Vec<RecordId>,
    pub failures: Vec<BatchFailure>,
    pub ledger_entry: Option<LedgerEntryId>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.total - self.applied.len()
    }

    /// "N of M applied".
    pub fn summary(&self) -> String {
        format!("{} of {} applied", self.applied.len(), self.total)
    }

    pub fn into_result(self) -> Result<Self, EngineError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(EngineError::BatchIncomplete {
                applied: self.applied.len(),
                total: self.total,
                pending: self.pending(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateReport {
    pub created: Vec<WorklogRecord>,
    pub failures: Vec<(IssueKey, StoreError)>,
    pub ledger_entry: Option<LedgerEntryId>,
}

/// Wires distribution planning, batch application and the ledger together.
///
/// Optionally takes a [`WeightGenerator`] for the weighted policy; without one,
/// weighted requests are planned proportionally.
pub struct RebalanceService<S> {
    store: Arc<S>,
    generator: Option<Arc<dyn WeightGenerator>>,
    engine: DistributionEngine,
    clock: Arc<dyn Clock>,
}

impl<S> RebalanceService<S> {
    pub fn new(store: Arc<S>, engine: DistributionEngine) -> Self {
        Self {
            store,
            generator: None,
            engine,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_weight_generator(mut self, generator: Arc<dyn WeightGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> &DistributionEngine {
        &self.engine
    }

    async fn resolve_policy(
        &self,
        records: &[WorklogRecord],
        kind: PolicyKind,
    ) -> (DistributionPolicy, Option<FallbackReason>) {
        match kind {
            PolicyKind::Equal => (DistributionPolicy::Equal, None),
            PolicyKind::Proportional => (DistributionPolicy::Proportional, None),
            PolicyKind::Weighted => {
                let Some(generator) = &self.generator else {
                    return (
                        DistributionPolicy::Proportional,
                        Some(FallbackReason::NoGenerator),
                    );
                };

                let reply = match generator.generate(records).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!("Weight generation failed, falling back to proportional: {}", e);
                        return (
                            DistributionPolicy::Proportional,
                            Some(FallbackReason::GeneratorFailed(e.to_string())),
                        );
                    }
                };

                match parse_weight_payload(&reply, records) {
                    Ok(weights) => (DistributionPolicy::Weighted(weights), None),
                    Err(e) => {
                        warn!("Unusable weight reply, falling back to proportional: {}", e);
                        (
                            DistributionPolicy::Proportional,
                            Some(FallbackReason::InvalidPayload(e.to_string())),
                        )
                    }
                }
            }
        }
    }

    /// Plan a redistribution over records the caller already holds.
    #[instrument(name = "RebalanceService::plan_records", skip(self, records), fields(records = records.len()))]
    pub async fn plan_records(
        &self,
        records: Vec<WorklogRecord>,
        target_seconds: i64,
        policy: PolicyKind,
    ) -> Result<PlannedRebalance, EngineError> {
        let durations: Vec<RecordDuration> = records.iter().map(RecordDuration::from).collect();
        let (resolved, mut fallback) = self.resolve_policy(&records, policy).await;

        let plan = match self.engine.plan(&durations, target_seconds, &resolved) {
            Err(e @ ValidationError::InvalidWeights(_)) => {
                warn!("Weights rejected, falling back to proportional: {}", e);
                fallback = Some(FallbackReason::InvalidPayload(e.to_string()));
                self.engine
                    .plan(&durations, target_seconds, &DistributionPolicy::Proportional)?
            }
            other => other?,
        };

        Ok(PlannedRebalance {
            records,
            plan,
            fallback,
        })
    }
}

impl<S: RecordStore> RebalanceService<S> {
    /// Fetch the worklogs of `date` and plan a redistribution of `target_seconds`.
    #[instrument(name = "RebalanceService::plan_for_date", skip(self))]
    pub async fn plan_for_date(
        &self,
        date: Date,
        target_seconds: i64,
        policy: PolicyKind,
    ) -> Result<PlannedRebalance, EngineError> {
        let records = self.store.fetch(date).await?;
        self.plan_records(records, target_seconds, policy).await
    }

    /// Write a plan to the store, one concurrent update per changed record.
    ///
    /// Not atomic: when some updates fail, the ones that landed stay. A single
    /// `BATCH_UPDATE` ledger entry is recorded for whatever was written.
    #[instrument(name = "RebalanceService::apply_plan", skip_all, fields(policy = %plan.policy, target = plan.target_seconds))]
    pub async fn apply_plan(
        &self,
        records: &[WorklogRecord],
        plan: &DistributionPlan,
        ledger: &mut ActionLedger,
    ) -> BatchReport {
        let by_id: HashMap<&RecordId, &WorklogRecord> =
            records.iter().map(|r| (&r.id, r)).collect();

        let mut applied: Vec<RecordId> = plan
            .assignments
            .iter()
            .filter(|a| !a.is_change())
            .map(|a| a.record_id.clone())
            .collect();

        let writes = plan.changes().map(|assignment| {
            let record = by_id.get(&assignment.record_id).copied();
            async move {
                let record =
                    record.ok_or_else(|| StoreError::NotFound(assignment.record_id.clone()))?;
                self.store
                    .update(&record.reference(), &WorklogUpdate::duration(assignment.new_seconds))
                    .await?;
                Ok::<_, StoreError>((record, assignment))
            }
        });
        let changed: Vec<_> = plan.changes().map(|a| a.record_id.clone()).collect();
        let results = join_all(writes).await;

        let mut undo_items = Vec::new();
        let mut failures = Vec::new();
        for (record_id, result) in changed.into_iter().zip(results) {
            match result {
                Ok((record, assignment)) => {
                    undo_items.push(
                        UpdatedItem::new(record.id.clone(), record.issue_key.clone())
                            .with_previous_seconds(assignment.previous_seconds),
                    );
                    applied.push(record_id);
                }
                Err(error) => {
                    warn!("Failed to update worklog {}: {}", record_id, error);
                    failures.push(BatchFailure { record_id, error });
                }
            }
        }

        let total = plan.assignments.len();
        let ledger_entry = if undo_items.is_empty() {
            None
        } else {
            let kind = if failures.is_empty() {
                LedgerKind::Success
            } else {
                LedgerKind::Warning
            };
            let entry = LedgerEntry::new(
                format!("Redistributed {}", format_duration(plan.target_seconds)),
                format!("{} of {} worklogs applied ({})", applied.len(), total, plan.policy),
                kind,
                self.clock.now(),
            )
            .with_undo(UndoAction::BatchUpdate { items: undo_items });
            Some(ledger.record(entry))
        };

        let report = BatchReport {
            total,
            applied,
            failures,
            ledger_entry,
        };
        if report.is_complete() {
            info!("Plan applied: {}", report.summary());
        } else {
            warn!("Plan partially applied: {}", report.summary());
        }
        report
    }

    /// Create worklogs concurrently and record one ledger entry for the ones that landed.
    #[instrument(name = "RebalanceService::create_worklogs", skip_all, fields(count = worklogs.len()))]
    pub async fn create_worklogs(
        &self,
        worklogs: Vec<NewWorklog>,
        ledger: &mut ActionLedger,
    ) -> CreateReport {
        let results = join_all(worklogs.iter().map(|w| self.store.create(w))).await;

        let mut created = Vec::new();
        let mut failures = Vec::new();
        for (worklog, result) in worklogs.into_iter().zip(results) {
            match result {
                Ok(record) => created.push(record),
                Err(e) => {
                    warn!("Failed to create worklog on {}: {}", worklog.issue_key, e);
                    failures.push((worklog.issue_key, e));
                }
            }
        }

        let ledger_entry = (!created.is_empty()).then(|| {
            let items = created
                .iter()
                .map(|r| CreatedItem::new(r.id.clone(), r.issue_key.clone()))
                .collect();
            let seconds: i64 = created.iter().map(|r| r.duration_seconds).sum();
            let entry = LedgerEntry::new(
                format!("Logged {}", format_duration(seconds)),
                format!(
                    "{} of {} worklogs created",
                    created.len(),
                    created.len() + failures.len()
                ),
                if failures.is_empty() {
                    LedgerKind::Success
                } else {
                    LedgerKind::Warning
                },
                self.clock.now(),
            )
            .with_undo(UndoAction::created(items));
            ledger.record(entry)
        });

        CreateReport {
            created,
            failures,
            ledger_entry,
        }
    }

    /// Commit a single edit: write it, snapshot the previous value into the
    /// per-record history, then ledger it. A failed write touches neither.
    ///
    /// Pass [`EditOrigin::HistoryStep`] when writing back a value obtained from
    /// [`HistoryManager::undo`] or [`HistoryManager::redo`].
    #[instrument(name = "RebalanceService::update_worklog", skip(self, record, update, history, ledger), fields(record_id = %record.id))]
    pub async fn update_worklog(
        &self,
        record: &WorklogRecord,
        update: &WorklogUpdate,
        origin: EditOrigin,
        history: &mut HistoryManager,
        ledger: &mut ActionLedger,
    ) -> Result<LedgerEntryId, EngineError> {
        let mut next = record.clone();
        next.apply(update);

        self.store.update(&record.reference(), update).await?;
        history.commit_edit(
            &record.id,
            &EditableFields::from(record),
            &EditableFields::from(&next),
            origin,
        );

        let mut undo = UpdatedItem::new(record.id.clone(), record.issue_key.clone());
        if update.comment.is_some() {
            undo = undo.with_previous_comment(record.comment.clone());
        }
        if update.duration_seconds.is_some() {
            undo = undo.with_previous_seconds(record.duration_seconds);
        }
        let (before, after) = match (&update.comment, update.duration_seconds) {
            (Some(comment), _) => (record.comment.clone(), comment.clone()),
            (None, Some(seconds)) => (
                format_duration(record.duration_seconds),
                format_duration(seconds),
            ),
            (None, None) => (String::new(), String::new()),
        };

        let entry = LedgerEntry::new(
            format!("Updated {}", record.issue_key),
            match origin {
                EditOrigin::User => "Worklog updated".to_string(),
                EditOrigin::HistoryStep => "Worklog restored from history".to_string(),
            },
            LedgerKind::Success,
            self.clock.now(),
        )
        .with_undo(UndoAction::updated(vec![undo]))
        .with_diff(ChangeDiff {
            before,
            after,
            issue_key: Some(record.issue_key.clone()),
        });

        Ok(ledger.record(entry))
    }

    /// Apply a ledger entry's undo action through this service's store.
    #[instrument(name = "RebalanceService::undo", skip(self, ledger))]
    pub async fn undo(
        &self,
        ledger: &mut ActionLedger,
        entry: LedgerEntryId,
    ) -> Result<UndoReport, EngineError> {
        ledger.apply_undo(entry, self.store.as_ref()).await
    }
}
