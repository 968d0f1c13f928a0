use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tally_engine::{
    adapters::outbound::{InMemoryRecordStore, JsonFileLedgerStore, ScriptedWeightGenerator},
    domain::{
        classify, format_duration,
        models::{LedgerEntryId, WorklogRecord},
        ports::outbound::LedgerStore,
        services::{PlannedRebalance, RebalanceService},
        ActionLedger, DistributionEngine, Intensity, IntensityCache, PolicyKind, SystemClock,
    },
};
use time::Date;
use tracing::info;

use crate::{config::TallyConfig, records};

fn build_service(
    config: &TallyConfig,
    store: Arc<InMemoryRecordStore>,
    weights: Option<&Path>,
) -> Result<RebalanceService<InMemoryRecordStore>> {
    let service = RebalanceService::new(store, DistributionEngine::new(config.engine.floor_seconds));
    let Some(path) = weights else {
        return Ok(service);
    };
    let reply = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read weights at {}", path.display()))?;
    Ok(service.with_weight_generator(Arc::new(ScriptedWeightGenerator::returning(reply))))
}

fn ledger_store(config: &TallyConfig) -> Result<JsonFileLedgerStore> {
    Ok(JsonFileLedgerStore::new(config.ledger_path()?)
        .with_retention(config.engine.ledger_retention())
        .with_capacity(config.engine.ledger_capacity))
}

async fn load_ledger(config: &TallyConfig) -> Result<(JsonFileLedgerStore, ActionLedger)> {
    let store = ledger_store(config)?;
    let entries = store.load().await?;
    let ledger = ActionLedger::from_entries(entries, config.engine.ledger_capacity);
    Ok((store, ledger))
}

fn print_plan(planned: &PlannedRebalance) {
    if let Some(reason) = &planned.fallback {
        println!("Weighted plan unavailable ({reason}), planned proportionally");
    }
    for assignment in &planned.plan.assignments {
        let issue = planned
            .records
            .iter()
            .find(|r| r.id == assignment.record_id)
            .map(|r| r.issue_key.as_str())
            .unwrap_or("?");
        let marker = if assignment.is_change() { "" } else { "  (unchanged)" };
        println!(
            "{:<12} {:>8} -> {:>8}{}",
            issue,
            format_duration(assignment.previous_seconds),
            format_duration(assignment.new_seconds),
            marker
        );
    }
    println!(
        "Total {} of target {} ({})",
        format_duration(planned.plan.total_seconds()),
        format_duration(planned.plan.target_seconds),
        planned.plan.policy
    );
}

pub async fn plan(
    config: &TallyConfig,
    records_path: &Path,
    target: Option<i64>,
    policy: PolicyKind,
    weights: Option<&Path>,
) -> Result<()> {
    let records = records::load(records_path)?;
    let service = build_service(config, Arc::new(InMemoryRecordStore::new()), weights)?;
    let target = target.unwrap_or_else(|| config.engine.default_target_seconds());

    let planned = service.plan_records(records, target, policy).await?;
    print_plan(&planned);
    Ok(())
}

pub async fn rebalance(
    config: &TallyConfig,
    store_path: &Path,
    date: Date,
    target: Option<i64>,
    policy: PolicyKind,
    weights: Option<&Path>,
) -> Result<()> {
    let store = Arc::new(InMemoryRecordStore::with_records(records::load(store_path)?));
    let service = build_service(config, store.clone(), weights)?;
    let (ledger_store, mut ledger) = load_ledger(config).await?;
    let target = target.unwrap_or_else(|| config.engine.default_target_seconds());

    let planned = service.plan_for_date(date, target, policy).await?;
    print_plan(&planned);

    let report = service
        .apply_plan(&planned.records, &planned.plan, &mut ledger)
        .await;
    records::save(store_path, &store.records())?;
    ledger_store.save(&ledger.to_vec()).await?;

    for failure in &report.failures {
        eprintln!("Failed to update {}: {}", failure.record_id, failure.error);
    }
    if let Some(entry) = report.ledger_entry {
        println!("{}. Undo with: tally undo {entry} --store {}", report.summary(), store_path.display());
    } else {
        println!("{}", report.summary());
    }
    report.into_result()?;
    Ok(())
}

pub async fn undo(config: &TallyConfig, entry_id: LedgerEntryId, store_path: &Path) -> Result<()> {
    let store = InMemoryRecordStore::with_records(records::load(store_path)?);
    let (ledger_store, mut ledger) = load_ledger(config).await?;

    let result = ledger.apply_undo(entry_id, &store).await;
    // Partial undos still changed the store and are retried from there.
    records::save(store_path, &store.records())?;
    ledger_store.save(&ledger.to_vec()).await?;

    let report = result?;
    info!(entry = %entry_id, reversed = report.reversed, skipped = report.skipped, "undo applied");
    println!("Reversed {} change(s), {} already gone", report.reversed, report.skipped);
    Ok(())
}

pub async fn ledger_list(config: &TallyConfig) -> Result<()> {
    let (_, ledger) = load_ledger(config).await?;
    if ledger.is_empty() {
        println!("No recorded actions");
        return Ok(());
    }
    for entry in ledger.entries() {
        let status = if entry.is_undoable() { "undoable" } else { "" };
        println!(
            "{}  {}  {}  {}: {}  {}",
            entry.id, entry.timestamp, entry.kind, entry.title, entry.message, status
        );
    }
    Ok(())
}

pub async fn ledger_clear(config: &TallyConfig) -> Result<()> {
    let (ledger_store, mut ledger) = load_ledger(config).await?;
    let dropped = ledger.len();
    ledger.clear();
    ledger_store.save(&ledger.to_vec()).await?;
    println!("Cleared {dropped} recorded action(s)");
    Ok(())
}

pub fn classify_work(comment: &str, summary: &str, hours: f64) {
    let intensity = classify(comment, summary, hours);
    println!("{} (score {})", intensity.tier, intensity.score);
}

/// Records sharing text and duration are scored once.
fn classify_all(cache: &mut IntensityCache, records: &[WorklogRecord]) -> Vec<Intensity> {
    records
        .iter()
        .map(|r| cache.classify(&r.comment, &r.summary, r.hours()))
        .collect()
}

pub fn classify_records(config: &TallyConfig, records_path: &Path) -> Result<()> {
    let records = records::load(records_path)?;
    let mut cache = IntensityCache::new(config.engine.intensity_cache_ttl(), Arc::new(SystemClock));

    for (record, intensity) in records.iter().zip(classify_all(&mut cache, &records)) {
        println!(
            "{:<12} {:>8}  {:<6} (score {})",
            record.issue_key.as_str(),
            format_duration(record.duration_seconds),
            intensity.tier.to_string(),
            intensity.score
        );
    }
    info!(records = records.len(), distinct = cache.len(), "classified records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tally_engine::domain::{IntensityTier, ManualClock};
    use time::macros::{date, datetime};

    const DAY: Date = date!(2024 - 03 - 04);

    fn find<'a>(records: &'a [WorklogRecord], id: &str) -> &'a WorklogRecord {
        records.iter().find(|r| r.id.as_str() == id).unwrap()
    }

    fn workspace() -> (tempfile::TempDir, TallyConfig, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TallyConfig {
            ledger_path: Some(dir.path().join("ledger.json")),
            ..TallyConfig::default()
        };
        config.engine.floor_seconds = 0;

        let store_path = dir.path().join("store.json");
        records::save(
            &store_path,
            &[
                WorklogRecord::new("1", "PROJ-1", 3_600, DAY),
                WorklogRecord::new("2", "PROJ-2", 7_200, DAY),
                WorklogRecord::new("3", "PROJ-3", 10_800, DAY),
                WorklogRecord::new("4", "PROJ-4", 1_800, date!(2024 - 03 - 05)),
            ],
        )
        .unwrap();
        (dir, config, store_path)
    }

    #[tokio::test]
    async fn rebalance_then_undo_restores_the_store() {
        let (_dir, config, store_path) = workspace();

        rebalance(&config, &store_path, DAY, Some(28_800), PolicyKind::Proportional, None)
            .await
            .unwrap();

        let after = records::load(&store_path).unwrap();
        assert_eq!(find(&after, "1").duration_seconds, 4_800);
        assert_eq!(find(&after, "3").duration_seconds, 14_400);
        assert_eq!(find(&after, "4").duration_seconds, 1_800);

        let (_, ledger) = load_ledger(&config).await.unwrap();
        assert_eq!(ledger.len(), 1);
        let entry_id = ledger.entries().next().unwrap().id;

        undo(&config, entry_id, &store_path).await.unwrap();
        let restored = records::load(&store_path).unwrap();
        assert_eq!(find(&restored, "1").duration_seconds, 3_600);
        assert_eq!(find(&restored, "3").duration_seconds, 10_800);

        // The entry is spent once applied.
        assert!(undo(&config, entry_id, &store_path).await.is_err());
    }

    #[tokio::test]
    async fn weights_file_drives_the_weighted_policy() {
        let (dir, config, store_path) = workspace();
        let weights = dir.path().join("weights.txt");
        std::fs::write(
            &weights,
            r#"[{"index": 0, "hours": 2}, {"index": 1, "hours": 1}, {"index": 2, "hours": 1}]"#,
        )
        .unwrap();

        rebalance(&config, &store_path, DAY, Some(28_800), PolicyKind::Weighted, Some(&weights))
            .await
            .unwrap();

        let after = records::load(&store_path).unwrap();
        assert_eq!(find(&after, "1").duration_seconds, 14_400);
        assert_eq!(find(&after, "2").duration_seconds, 7_200);
    }

    #[tokio::test]
    async fn clearing_the_ledger_empties_the_file() {
        let (_dir, config, store_path) = workspace();
        rebalance(&config, &store_path, DAY, Some(28_800), PolicyKind::Equal, None)
            .await
            .unwrap();

        ledger_clear(&config).await.unwrap();
        let (_, ledger) = load_ledger(&config).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn planning_does_not_touch_the_file() {
        let (_dir, config, store_path) = workspace();
        let before = std::fs::read_to_string(&store_path).unwrap();

        plan(&config, &store_path, None, PolicyKind::Equal, None)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&store_path).unwrap(), before);
        let (_, ledger) = load_ledger(&config).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn repeated_records_share_one_cache_entry() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-04 09:00 UTC)));
        let mut cache = IntensityCache::new(TallyConfig::default().engine.intensity_cache_ttl(), clock);
        let records = vec![
            WorklogRecord::new("1", "PROJ-1", 3_600, DAY).with_comment("urgent hotfix for outage"),
            WorklogRecord::new("2", "PROJ-1", 3_600, DAY).with_comment("urgent hotfix for outage"),
            WorklogRecord::new("3", "PROJ-2", 900, DAY).with_comment("fix typo in readme"),
        ];

        let scored = classify_all(&mut cache, &records);

        assert_eq!(scored[0], scored[1]);
        assert_eq!(scored[2].tier, IntensityTier::Low);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn classifying_a_records_file_succeeds() {
        let (_dir, config, store_path) = workspace();
        classify_records(&config, &store_path).unwrap();
    }
}
