//! The `analyze` command

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use colored::Colorize;
use monitor_lib::enricher::EnrichmentTable;
use monitor_lib::report::InventoryFile;
use monitor_lib::{
    fetch_events, AnalysisReport, Analyzer, FileEventSource, MonitorMetrics, SourceSelection,
    StructuredLogger, TimeRange,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tabled::Tabled;
use tracing::info;

use crate::config::MonitorConfig;
use crate::output::{
    color_change_pct, color_source, format_avg_bytes, format_bytes, format_duration, format_pct,
    print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Options for one analysis run, after merging flags over configuration
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub events_dir: PathBuf,
    pub days: u32,
    pub now: DateTime<Utc>,
    pub filter: Option<String>,
    pub source: SourceSelection,
    pub inventory: Option<PathBuf>,
    pub enrichment: Option<PathBuf>,
    pub metrics_out: Option<PathBuf>,
}

/// Row for the resource table
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Daily Change")]
    daily_change: String,
    #[tabled(rename = "Change %")]
    change_pct: String,
    #[tabled(rename = "Jobs")]
    jobs: usize,
    #[tabled(rename = "Avg Duration")]
    avg_duration: String,
}

/// Row for the anomaly table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Transferred")]
    transferred: String,
    #[tabled(rename = "Average")]
    average: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Reasons")]
    reasons: String,
}

/// Row for the daily baseline table
#[derive(Tabled)]
struct DailyRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "New")]
    new: String,
    #[tabled(rename = "Deleted")]
    deleted: String,
    #[tabled(rename = "Suspicious")]
    suspicious: String,
    #[tabled(rename = "Protected")]
    protected: String,
    #[tabled(rename = "Resources")]
    resources: usize,
}

fn load_enrichment(path: &Path) -> Result<EnrichmentTable> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read enrichment table {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse enrichment table {}", path.display()))
}

fn build_analyzer(options: &AnalyzeOptions, config: &MonitorConfig) -> Result<Analyzer> {
    let mut analyzer = Analyzer::new(config.analysis.clone())
        .with_logger(StructuredLogger::new(options.events_dir.display().to_string()));

    if let Some(path) = &options.inventory {
        let inventory = InventoryFile::load(path)
            .with_context(|| format!("Failed to load inventory {}", path.display()))?;
        analyzer = analyzer.with_size_lookup(Arc::new(inventory));
    }
    if let Some(path) = &options.enrichment {
        analyzer = analyzer.with_enrichment_table(load_enrichment(path)?);
    }
    Ok(analyzer)
}

/// Fetch, analyse and print one run
pub async fn run(options: AnalyzeOptions, config: &MonitorConfig, format: OutputFormat) -> Result<()> {
    let boundary = options.now - Duration::days(1);
    let range = TimeRange::trailing_days(options.now, options.days.saturating_add(1))
        .context("Invalid --days for the analysis window")?;
    let analyzer = build_analyzer(&options, config)?;

    info!(
        events_dir = %options.events_dir.display(),
        start = %range.start,
        boundary = %boundary,
        source = ?options.source,
        "Fetching backup events"
    );
    let source = FileEventSource::new(&options.events_dir);
    let events = fetch_events(&source, &range, options.source)
        .await
        .context("Failed to fetch backup events")?;

    let started = Instant::now();
    let report = analyzer.analyze(&events, boundary, options.filter.as_deref());

    let metrics = MonitorMetrics::new();
    metrics.observe_analysis_latency(started.elapsed().as_secs_f64());
    metrics.record(&report);
    if let Some(path) = &options.metrics_out {
        let text = metrics.encode_text().context("Failed to encode metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    let summary = &report.summary;
    println!("{}", "Backup Summary".bold());
    println!("{}", "=".repeat(50));
    println!("Vault jobs:             {}", summary.vault_jobs);
    println!("Appliance jobs:         {}", summary.appliance_jobs);
    println!(
        "Jobs (ok / failed / other): {} / {} / {}",
        report.job_counts.successful.to_string().green(),
        report.job_counts.failed.to_string().red(),
        report.job_counts.other
    );
    println!(
        "Protected size:         {}",
        format_bytes(summary.total_resource_size_bytes)
    );
    println!(
        "Daily change:           {} ({})",
        format_avg_bytes(summary.daily_change_bytes),
        format_pct(summary.daily_change_pct)
    );
    println!();

    let resources: Vec<ResourceRow> = report
        .resource_reports
        .iter()
        .map(|r| ResourceRow {
            resource: r.resource_name.clone(),
            resource_type: r.resource_type.clone(),
            source: color_source(r.source),
            size: if r.size_from_lookup {
                format!("{}*", format_bytes(r.total_resource_size_bytes))
            } else {
                format_bytes(r.total_resource_size_bytes)
            },
            daily_change: format_avg_bytes(r.daily_change_bytes),
            change_pct: color_change_pct(r.daily_change_pct),
            jobs: r.job_count,
            avg_duration: format_duration(r.avg_duration_seconds),
        })
        .collect();
    print_table("Resources", &resources);
    println!();

    let anomalies: Vec<AnomalyRow> = report
        .anomalies
        .iter()
        .map(|a| AnomalyRow {
            time: a.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            resource: a.resource_name.clone(),
            transferred: format_bytes(a.bytes_transferred),
            average: format_avg_bytes(a.avg_bytes_transferred),
            duration: format_duration(f64::from(a.duration_seconds)),
            reasons: a
                .reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
                .red()
                .to_string(),
        })
        .collect();
    if anomalies.is_empty() {
        print_success("No anomalies detected");
    } else {
        print_table("Anomalies", &anomalies);
    }
    println!();

    let daily: Vec<DailyRow> = report
        .daily_baselines
        .iter()
        .map(|d| DailyRow {
            date: d.date.to_string(),
            modified: format_bytes(d.modified_bytes),
            new: format!("{} ({})", format_bytes(d.new_bytes), d.new_resource_count),
            deleted: format!("{} ({})", format_bytes(d.deleted_bytes), d.deleted_resource_count),
            suspicious: format_bytes(d.suspicious_bytes),
            protected: format_bytes(d.total_protected_bytes),
            resources: d.resource_count,
        })
        .collect();
    print_table("Daily Baselines", &daily);

    if summary.zero_size_vault_count > 0 {
        println!();
        print_warning(&format!(
            "{} of {} vault resources have no known size",
            summary.zero_size_vault_count, summary.vault_resource_count
        ));
    }
    let diagnostics = &report.diagnostics;
    if diagnostics.malformed_events > 0 || diagnostics.lookup_failures > 0 {
        print_warning(&format!(
            "Skipped {} malformed events, {} size lookups failed",
            diagnostics.malformed_events, diagnostics.lookup_failures
        ));
    }
}
