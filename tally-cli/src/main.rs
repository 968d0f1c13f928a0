mod cli;
mod commands;
mod config;
mod records;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, LedgerCommand};
use config::TallyConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::ConfigPath = cli.command {
        let path = TallyConfig::config_path()?;
        if !path.exists() {
            TallyConfig::default().save_to(&path)?;
            println!("Created default config at: {}", path.display());
        } else {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = TallyConfig::load()?;
    match cli.command {
        Commands::Plan {
            records,
            target,
            policy,
            weights,
        } => commands::plan(&config, &records, target, policy, weights.as_deref()).await,
        Commands::Rebalance {
            store,
            date,
            target,
            policy,
            weights,
        } => {
            commands::rebalance(&config, &store, date, target, policy, weights.as_deref()).await
        }
        Commands::Undo { entry_id, store } => commands::undo(&config, entry_id, &store).await,
        Commands::Ledger { command } => match command {
            LedgerCommand::List => commands::ledger_list(&config).await,
            LedgerCommand::Clear => commands::ledger_clear(&config).await,
        },
        Commands::Classify {
            comment,
            summary,
            hours,
            records,
        } => match (records, comment, hours) {
            (Some(path), _, _) => commands::classify_records(&config, &path),
            (None, Some(comment), Some(hours)) => {
                commands::classify_work(&comment, &summary, hours);
                Ok(())
            }
            _ => anyhow::bail!("classify needs --records, or --comment with --hours"),
        },
        Commands::ConfigPath => Ok(()),
    }
}
