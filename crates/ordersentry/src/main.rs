//! `OrderSentry` batch runner.
//!
//! Feeds categorized email threads through the alert lifecycle and prints
//! what needs attention. Intended to run from cron or a systemd timer.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ordersentry_core::{
    AccountingClient, AccountingResult, AlertLifecycleManager, AlertRepository, CategorizedThread,
    Customer, CycleReport, DocumentQuery, HttpAccountingClient, JobDocuments, NullAccountingClient,
};

use config::Config;

#[derive(Parser)]
#[command(name = "ordersentry", version, about = "Purchase-order monitoring")]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full alert cycle over categorized threads.
    RunCycle {
        /// JSON file with an array of categorized threads, as produced by
        /// the upstream categorizer. Omit to only re-check existing alerts.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print open alerts grouped by type.
    Summary,
    /// Dismiss an open alert by id.
    Dismiss {
        /// Alert id.
        id: i64,
    },
}

/// Accounting backend picked from config at startup.
enum Backend {
    Http(HttpAccountingClient),
    Disabled(NullAccountingClient),
}

impl AccountingClient for Backend {
    async fn fetch_customers(&self) -> AccountingResult<Vec<Customer>> {
        match self {
            Self::Http(client) => client.fetch_customers().await,
            Self::Disabled(client) => client.fetch_customers().await,
        }
    }

    async fn fetch_job_documents(
        &self,
        customer_id: &str,
        query: &DocumentQuery,
    ) -> AccountingResult<JobDocuments> {
        match self {
            Self::Http(client) => client.fetch_job_documents(customer_id, query).await,
            Self::Disabled(client) => client.fetch_job_documents(customer_id, query).await,
        }
    }
}

fn backend(config: &Config) -> Backend {
    match &config.accounting.base_url {
        Some(base_url) if !base_url.is_empty() => {
            let mut client = HttpAccountingClient::new(base_url.clone());
            if let Some(token) = &config.accounting.token {
                client = client.with_token(token.clone());
            }
            Backend::Http(client)
        }
        _ => {
            warn!("no accounting base URL configured, customer matching disabled");
            Backend::Disabled(NullAccountingClient)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ordersentry=info,ordersentry_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let database_path = config.database_path()?;
    let repository = AlertRepository::new(
        database_path
            .to_str()
            .context("database path is not valid UTF-8")?,
    )
    .await?;

    match cli.command {
        Command::RunCycle { input } => {
            let threads = match input {
                Some(path) => read_threads(&path)?,
                None => Vec::new(),
            };
            info!(threads = threads.len(), "starting cycle");

            let mut manager = AlertLifecycleManager::new(repository, backend(&config));
            if let Some(hours) = config.escalation_hours {
                manager = manager.with_escalation_threshold(chrono::Duration::hours(hours));
            }

            let report = manager.run_cycle(&threads).await;
            print_report(&manager, &report).await?;
        }
        Command::Summary => {
            let summary = repository.open_summary().await?;
            if summary.is_empty() {
                println!("no open alerts");
            }
            for (alert_type, count) in summary {
                println!("{count:>5}  {}", alert_type.as_str());
            }
        }
        Command::Dismiss { id } => {
            let manager = AlertLifecycleManager::new(repository, NullAccountingClient);
            if manager.dismiss_alert(id).await? {
                println!("alert {id} dismissed");
            } else {
                anyhow::bail!("alert {id} is not open");
            }
        }
    }

    Ok(())
}

fn read_threads(path: &std::path::Path) -> anyhow::Result<Vec<CategorizedThread>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

async fn print_report(
    manager: &AlertLifecycleManager<Backend>,
    report: &CycleReport,
) -> anyhow::Result<()> {
    println!(
        "cycle done: {} created, {} escalated, {} auto-resolved, {} close suggestions",
        report.created, report.escalated, report.auto_resolved, report.closeable_flagged
    );

    for alert in &report.open_alerts {
        println!(
            "  [{}] #{} {} <{}> po={} detected={}",
            alert.alert_type.as_str(),
            alert.id,
            alert.contact_name,
            alert.contact_email,
            alert.po_number.as_deref().unwrap_or("-"),
            alert.detected_at.to_rfc3339(),
        );
        manager
            .repository()
            .mark_notified_at(alert.id, chrono::Utc::now())
            .await?;
    }
    Ok(())
}
