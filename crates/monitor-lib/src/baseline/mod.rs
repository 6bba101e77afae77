//! Baseline statistics
//!
//! Per-resource statistics for the history and current windows, and the
//! day-by-day volume baselines derived from reconciled jobs.

mod daily;
mod stats;

pub use daily::{daily_baselines, DailyBaseline};
pub use stats::{
    change_pct, partition, Baseline, Current, History, Partition, ResourceStats, Window,
    WindowStats,
};
