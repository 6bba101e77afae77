//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::JobSource;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table, or a notice when there is nothing to show
pub fn print_table<T: Tabled>(title: &str, items: &[T]) {
    println!("{}", title.bold());
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2}Ti", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2}Gi", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Format a fractional byte average
pub fn format_avg_bytes(bytes: f64) -> String {
    format_bytes(bytes.max(0.0).round() as u64)
}

pub fn format_pct(pct: f64) -> String {
    format!("{:.2}%", pct)
}

/// Format seconds as `1h02m03s`, `2m05s` or `7s`
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Color a source label
pub fn color_source(source: JobSource) -> String {
    match source {
        JobSource::Vault => source.to_string().cyan().to_string(),
        JobSource::Appliance => source.to_string().magenta().to_string(),
    }
}

/// Color a daily change percentage; large churn stands out
pub fn color_change_pct(pct: f64) -> String {
    let formatted = format_pct(pct);
    if pct >= 20.0 {
        formatted.red().to_string()
    } else if pct >= 5.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
