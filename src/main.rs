use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod access;
mod conversion;
mod error;
mod filter;
mod http;
mod models;
mod rank;
mod report;
mod store;

use filter::{filter_records, RecordFilter};
use models::{Field, TransactionRecord};
use store::Snapshot;

#[derive(Parser)]
#[command(name = "activation-kpi")]
#[command(about = "Sales and activation KPIs served from flat transaction files", long_about = None)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, env = "KPI_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API over a snapshot loaded at startup
    Serve {
        #[arg(long, env = "KPI_DATA_FILE")]
        data: PathBuf,
        #[arg(long, env = "KPI_USERS_FILE")]
        users: Option<PathBuf>,
        #[arg(long, env = "KPI_BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
    /// Print the best sellers by transaction count
    Leaderboard {
        #[arg(long, env = "KPI_DATA_FILE")]
        data: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown KPI report
    Report {
        #[arg(long, env = "KPI_DATA_FILE")]
        data: PathBuf,
        #[arg(long)]
        seller_id: Option<String>,
        #[arg(long)]
        entity_name: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_records(path: &std::path::Path) -> anyhow::Result<Vec<TransactionRecord>> {
    store::load_records(path)
        .with_context(|| format!("failed to load transactions from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Serve { data, users, bind } => {
            let snapshot = Snapshot::load(&data, users.as_deref())
                .context("failed to load startup snapshot")?;
            if snapshot.directory().is_empty() {
                tracing::warn!("no user directory loaded, authenticated routes will reject every msisdn");
            }
            http::serve(bind, snapshot).await?;
        }
        Commands::Leaderboard { data, limit } => {
            let records = load_records(&data)?;
            let refs: Vec<&TransactionRecord> = records.iter().collect();
            let sellers = report::leaderboard(&refs)?;

            if sellers.is_empty() {
                println!("No transactions found.");
                return Ok(());
            }

            println!("Top sellers by transactions:");
            for row in sellers.iter().take(limit) {
                let transactions = row.sum(Field::TransactionCount).unwrap_or(0);
                let activations = row.sum(Field::ActivationCount).unwrap_or(0);
                let rates = conversion::rates(transactions, activations);
                println!(
                    "- {}: {} transactions, {} activations, conversion {:.3}",
                    report::label(row),
                    transactions,
                    activations,
                    rates.conversion_rate.unwrap_or(0.0)
                );
            }
        }
        Commands::Report {
            data,
            seller_id,
            entity_name,
            out,
        } => {
            let records = load_records(&data)?;
            let filter = RecordFilter {
                seller_id,
                entity_name,
                ..RecordFilter::default()
            };
            let selected = filter_records(&records, &filter.predicates()?);
            let scope = filter.describe();
            let report = report::build_report(scope.as_deref(), &selected)?;
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
