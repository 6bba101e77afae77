//! Per-resource window statistics
//!
//! Successful jobs are split at a boundary instant into a history window
//! (at or before the boundary) and a current window (after it). Each window
//! is summarised per resource. The window is part of the type, so a history
//! baseline can never be confused with the window being evaluated.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::models::JobRecord;

mod sealed {
    pub trait Sealed {}
}

/// Marker for a statistics window
pub trait Window: sealed::Sealed {
    const LABEL: &'static str;
}

/// Jobs at or before the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {}

/// Jobs after the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Current {}

impl sealed::Sealed for History {}
impl sealed::Sealed for Current {}

impl Window for History {
    const LABEL: &'static str = "history";
}

impl Window for Current {
    const LABEL: &'static str = "current";
}

/// Aggregate over one resource's jobs in one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceStats {
    pub resource_name: String,
    /// First non-empty type seen
    pub resource_type: String,
    pub data_point_count: usize,
    pub avg_bytes_transferred: f64,
    /// Sample standard deviation, 0 with fewer than two points
    pub stdev_bytes_transferred: f64,
    pub avg_duration_seconds: f64,
    pub stdev_duration_seconds: f64,
    /// Mean over jobs that reported a size, 0 if none did
    pub avg_total_resource_size_bytes: f64,
    /// First project any job was logged in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ResourceStats {
    pub fn daily_change_pct(&self) -> f64 {
        change_pct(self.avg_bytes_transferred, self.avg_total_resource_size_bytes)
    }
}

/// `change / total * 100`, or 0 when the total is unknown
pub fn change_pct(change: f64, total: f64) -> f64 {
    if total > 0.0 {
        change / total * 100.0
    } else {
        0.0
    }
}

/// Arithmetic mean and sample standard deviation (Bessel's correction)
pub(crate) fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn summarise(resource_name: &str, jobs: &[&JobRecord]) -> ResourceStats {
    let bytes: Vec<f64> = jobs.iter().map(|j| j.bytes_transferred as f64).collect();
    let durations: Vec<f64> = jobs.iter().map(|j| f64::from(j.duration_seconds)).collect();
    let sizes: Vec<f64> = jobs
        .iter()
        .filter(|j| j.total_resource_size_bytes > 0)
        .map(|j| j.total_resource_size_bytes as f64)
        .collect();

    let (avg_bytes, stdev_bytes) = mean_and_stdev(&bytes);
    let (avg_duration, stdev_duration) = mean_and_stdev(&durations);
    let (avg_size, _) = mean_and_stdev(&sizes);

    ResourceStats {
        resource_name: resource_name.to_string(),
        resource_type: jobs
            .iter()
            .map(|j| j.resource_type.as_str())
            .find(|t| !t.is_empty())
            .unwrap_or_default()
            .to_string(),
        data_point_count: jobs.len(),
        avg_bytes_transferred: avg_bytes,
        stdev_bytes_transferred: stdev_bytes,
        avg_duration_seconds: avg_duration,
        stdev_duration_seconds: stdev_duration,
        avg_total_resource_size_bytes: avg_size,
        project_id: jobs.iter().find_map(|j| j.project_id.clone()),
    }
}

/// Per-resource statistics for one window, keyed by resource name
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats<W: Window> {
    stats: BTreeMap<String, ResourceStats>,
    _window: PhantomData<W>,
}

impl<W: Window> WindowStats<W> {
    pub(crate) fn compute<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        let mut by_resource: BTreeMap<&'a str, Vec<&'a JobRecord>> = BTreeMap::new();
        for record in records {
            by_resource
                .entry(record.resource_name.as_str())
                .or_default()
                .push(record);
        }

        let stats: BTreeMap<String, ResourceStats> = by_resource
            .into_iter()
            .map(|(name, jobs)| (name.to_string(), summarise(name, &jobs)))
            .collect();

        debug!(window = W::LABEL, resources = stats.len(), "Computed window statistics");
        Self {
            stats,
            _window: PhantomData,
        }
    }

    pub fn get(&self, resource_name: &str) -> Option<&ResourceStats> {
        self.stats.get(resource_name)
    }

    /// Stats in resource-name order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceStats> {
        self.stats.values()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

/// Successful jobs split at the boundary
#[derive(Debug, Clone, Default)]
pub struct Partition<'a> {
    pub history: Vec<&'a JobRecord>,
    pub current: Vec<&'a JobRecord>,
}

/// Split successful records at `boundary`; other statuses are left out
pub fn partition(records: &[JobRecord], boundary: DateTime<Utc>) -> Partition<'_> {
    let mut split = Partition::default();
    for record in records.iter().filter(|r| r.is_successful()) {
        if record.timestamp > boundary {
            split.current.push(record);
        } else {
            split.history.push(record);
        }
    }
    split
}

/// History and current window statistics for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub history: WindowStats<History>,
    pub current: WindowStats<Current>,
}

impl Baseline {
    /// Partition `records` at `boundary` and summarise both windows
    pub fn calculate(records: &[JobRecord], boundary: DateTime<Utc>) -> Self {
        Self::from_partition(&partition(records, boundary))
    }

    pub fn from_partition(split: &Partition<'_>) -> Self {
        Self {
            history: WindowStats::compute(split.history.iter().copied()),
            current: WindowStats::compute(split.current.iter().copied()),
        }
    }
}
