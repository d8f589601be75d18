//! Escalator CLI
//!
//! Drives a single escalation run (or a horizon maintenance pass) from
//! JSON fixtures on disk. Notifications go through the logging
//! dispatcher, so this is a dry-run harness for rosters and policies
//! rather than a production pager.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use durable::{FileJournalStore, JournalStore, MemoryJournalStore, RunRegistry};
use escalator::{
    Alert, AlertOrchestrator, EngineConfig, HorizonExtender, LogDispatcher, MemoryAlertStore,
    MemoryRotationStore, RotationSlice, RotationStore, SliceCoverageResolver,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Tiered on-call alert escalation", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one alert through the escalation flow
    Run {
        /// Path to the alert JSON file
        #[arg(long)]
        alert: PathBuf,

        /// Path to the rotation-slice JSON file (array of slices)
        #[arg(long)]
        roster: PathBuf,

        /// Directory for durable run journals; in-memory when omitted
        #[arg(long)]
        journal_dir: Option<PathBuf>,
    },
    /// Extend a customer's rotation horizon
    ExtendHorizon {
        /// Path to the rotation-slice JSON file (array of slices)
        #[arg(long)]
        roster: PathBuf,

        /// Customer whose horizon to extend
        #[arg(long)]
        customer: String,

        /// Days of coverage to keep ahead of now
        #[arg(long, default_value_t = escalator::DEFAULT_HORIZON_DAYS)]
        days: i64,
    },
}

fn load_roster(path: &PathBuf) -> Result<Arc<MemoryRotationStore>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading roster file {}", path.display()))?;
    let slices: Vec<RotationSlice> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let store = Arc::new(MemoryRotationStore::new());
    for slice in slices {
        store.insert(slice);
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run {
            alert,
            roster,
            journal_dir,
        } => {
            let raw = fs::read_to_string(&alert)
                .with_context(|| format!("reading alert file {}", alert.display()))?;
            let alert: Alert = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", alert.display()))?;

            let rotations = load_roster(&roster)?;
            let config = EngineConfig::default();
            let resolver = Arc::new(SliceCoverageResolver::new(
                rotations,
                config.default_policy.clone(),
            ));

            let journal: Arc<dyn JournalStore> = match journal_dir {
                Some(dir) => Arc::new(FileJournalStore::open(dir)?),
                None => Arc::new(MemoryJournalStore::new()),
            };

            let alerts = Arc::new(MemoryAlertStore::new());
            alerts.insert(alert.clone());

            let orchestrator = AlertOrchestrator::new(
                resolver,
                alerts.clone(),
                Arc::new(LogDispatcher::new()),
                journal,
                Arc::new(RunRegistry::new()),
                config,
            );

            let outcome = orchestrator.run(&alert).await?;
            info!(alert_id = %alert.id, %outcome, "Run complete");
            if let Some(final_alert) = alerts.snapshot(&alert.id) {
                println!("{}", serde_json::to_string_pretty(&final_alert)?);
            }
        }
        Command::ExtendHorizon {
            roster,
            customer,
            days,
        } => {
            let rotations = load_roster(&roster)?;
            let extender = HorizonExtender::new(rotations.clone(), days);
            extender.run_once(&[customer.clone()], Utc::now()).await;
            match rotations.horizon_end(&customer).await? {
                Some(end) => println!("horizon for {customer} now ends at {end}"),
                None => println!("no rotation data for {customer}"),
            }
        }
    }

    Ok(())
}
