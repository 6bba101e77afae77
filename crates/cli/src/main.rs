//! GCBDR backup job monitor CLI
//!
//! Analyses exported backup job logs for size and duration anomalies and
//! reports per-resource change rates.

mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::analyze::{self, AnalyzeOptions};
use monitor_lib::SourceSelection;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// GCBDR backup job monitor
#[derive(Parser)]
#[command(name = "gcbdr-monitor")]
#[command(author, version, about = "Backup job anomaly monitor for GCBDR", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, short, env = "GCBDR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse exported backup job logs
    Analyze {
        /// Directory holding vault.jsonl, appliance.jsonl and enrichment.jsonl
        #[arg(long)]
        events_dir: Option<PathBuf>,

        /// Days of history before the evaluated day
        #[arg(long)]
        days: Option<u32>,

        /// End of the evaluated day (RFC 3339, defaults to now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Resource name filter: substring, or glob when it contains * ? [
        #[arg(long)]
        filter: Option<String>,

        /// Which job sources to fetch (all, vault, appliance)
        #[arg(long, default_value = "all")]
        source_type: SourceSelection,

        /// JSON inventory used to size resources
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// JSON enrichment table (job name -> sizes) merged under the batch
        #[arg(long)]
        enrichment: Option<PathBuf>,

        /// Write Prometheus text metrics to this file
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = config::MonitorConfig::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Analyze {
            events_dir,
            days,
            now,
            filter,
            source_type,
            inventory,
            enrichment,
            metrics_out,
        } => {
            let options = AnalyzeOptions {
                events_dir: events_dir
                    .or_else(|| config.events_dir.clone())
                    .unwrap_or_else(|| PathBuf::from(".")),
                days: days.unwrap_or(config.days),
                now: now.unwrap_or_else(Utc::now),
                filter,
                source: source_type,
                inventory: inventory.or_else(|| config.inventory.clone()),
                enrichment,
                metrics_out,
            };
            analyze::run(options, &config, cli.format).await
        }
    };

    if let Err(error) = &result {
        output::print_error(&format!("{:#}", error));
    }
    result
}
