use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tally_engine::domain::{models::LedgerEntryId, parse_duration_input, PolicyKind};
use time::{macros::format_description, Date};

#[derive(Debug, Parser)]
#[command(name = "tally")]
#[command(about = "Redistribute logged time across a day's worklogs, with undo")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print a redistribution plan for a records file without writing anything
    Plan {
        /// JSON file holding an array of worklog records
        #[arg(long)]
        records: PathBuf,
        /// Target for the day, e.g. "8", "7.5h" or "7h 30m"
        #[arg(long = "target-hours", value_parser = parse_target)]
        target: Option<i64>,
        #[arg(long, default_value = "proportional")]
        policy: PolicyKind,
        /// File holding a weight reply, used by the weighted policy
        #[arg(long)]
        weights: Option<PathBuf>,
    },
    /// Apply a redistribution to the worklogs of one day in a store file
    Rebalance {
        #[arg(long)]
        store: PathBuf,
        #[arg(long, value_parser = parse_date)]
        date: Date,
        #[arg(long = "target-hours", value_parser = parse_target)]
        target: Option<i64>,
        #[arg(long, default_value = "proportional")]
        policy: PolicyKind,
        #[arg(long)]
        weights: Option<PathBuf>,
    },
    /// Reverse a recorded action
    Undo {
        entry_id: LedgerEntryId,
        #[arg(long)]
        store: PathBuf,
    },
    /// Inspect or clear the action ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
    /// Score how demanding a piece of work reads
    Classify {
        #[arg(long, required_unless_present = "records", conflicts_with = "records")]
        comment: Option<String>,
        #[arg(long, default_value = "")]
        summary: String,
        #[arg(long, required_unless_present = "records")]
        hours: Option<f64>,
        /// Classify every record in a JSON records file instead
        #[arg(long)]
        records: Option<PathBuf>,
    },
    /// Print config path and create default file if missing
    ConfigPath,
}

#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    /// List recorded actions, newest first
    List,
    /// Drop every recorded action
    Clear,
}

fn parse_target(raw: &str) -> Result<i64, String> {
    parse_duration_input(raw).map_err(|e| e.to_string())
}

fn parse_date(raw: &str) -> Result<Date, String> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_rebalance_arguments() {
        let cli = Cli::try_parse_from([
            "tally",
            "rebalance",
            "--store",
            "day.json",
            "--date",
            "2024-03-04",
            "--target-hours",
            "7h 30m",
            "--policy",
            "Equal",
        ])
        .unwrap();

        match cli.command {
            Commands::Rebalance {
                date,
                target,
                policy,
                weights,
                ..
            } => {
                assert_eq!(date, date!(2024 - 03 - 04));
                assert_eq!(target, Some(27_000));
                assert_eq!(policy, PolicyKind::Equal);
                assert!(weights.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn classify_takes_text_or_a_records_file() {
        let cli = Cli::try_parse_from(["tally", "classify", "--records", "day.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Classify { records: Some(_), comment: None, .. }
        ));

        assert!(Cli::try_parse_from(["tally", "classify", "--comment", "hotfix", "--hours", "2"]).is_ok());
        assert!(Cli::try_parse_from(["tally", "classify", "--comment", "hotfix"]).is_err());
        assert!(Cli::try_parse_from(["tally", "classify"]).is_err());
    }

    #[test]
    fn rejects_bad_targets_and_ids() {
        assert!(Cli::try_parse_from(["tally", "plan", "--records", "r.json", "--target-hours", "-2"]).is_err());
        assert!(Cli::try_parse_from(["tally", "undo", "not-a-uuid", "--store", "s.json"]).is_err());
    }
}
