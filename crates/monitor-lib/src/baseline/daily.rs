//! Day-by-day protected data volumes
//!
//! Records are bucketed by UTC calendar day. The first day seen is the
//! reference set for "new" resources; every resource seen on an earlier day
//! but missing from a later one counts as deleted on that day. On the report
//! day jobs may simply not have run yet, so deletions are held back and the
//! missing resources are still counted as protected.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Anomaly, JobRecord};

/// Volumes for one calendar day, in bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyBaseline {
    pub date: NaiveDate,
    pub modified_bytes: u64,
    pub new_bytes: u64,
    pub deleted_bytes: u64,
    pub suspicious_bytes: u64,
    pub total_protected_bytes: u64,
    pub resource_count: usize,
    pub new_resource_count: usize,
    pub deleted_resource_count: usize,
}

/// Build one baseline per day present in `records`, oldest first.
///
/// # Arguments
/// * `records` - reconciled jobs, any status
/// * `anomalies` - flagged jobs; their transfers count as suspicious
/// * `known_sizes` - best known size per resource, used when a job carries
///   none and to size deleted resources
/// * `report_day` - day on which deletions are suppressed
pub fn daily_baselines<'a, I>(
    records: I,
    anomalies: &[Anomaly],
    known_sizes: &BTreeMap<String, u64>,
    report_day: NaiveDate,
) -> Vec<DailyBaseline>
where
    I: IntoIterator<Item = &'a JobRecord>,
{
    let mut by_day: BTreeMap<NaiveDate, Vec<&'a JobRecord>> = BTreeMap::new();
    for record in records {
        by_day
            .entry(record.timestamp.date_naive())
            .or_default()
            .push(record);
    }

    let first_day: BTreeSet<&str> = by_day
        .values()
        .next()
        .map(|jobs| jobs.iter().map(|j| j.resource_name.as_str()).collect())
        .unwrap_or_default();
    let mut seen = first_day.clone();

    let known = |name: &str| known_sizes.get(name).copied().unwrap_or(0);

    let mut baselines = Vec::with_capacity(by_day.len());
    for (date, jobs) in &by_day {
        let mut sizes: BTreeMap<&str, u64> = BTreeMap::new();
        let mut modified_bytes = 0u64;
        for job in jobs {
            let size = match job.total_resource_size_bytes {
                0 => known(&job.resource_name),
                size => size,
            };
            let slot = sizes.entry(job.resource_name.as_str()).or_default();
            *slot = (*slot).max(size);
            modified_bytes = modified_bytes.saturating_add(job.bytes_transferred);
        }

        let suspicious_bytes = anomalies
            .iter()
            .filter(|a| a.timestamp.date_naive() == *date)
            .fold(0u64, |sum, a| sum.saturating_add(a.bytes_transferred));

        let mut new_bytes = 0u64;
        let mut new_resource_count = 0;
        for (name, size) in &sizes {
            if !first_day.contains(name) {
                new_bytes = new_bytes.saturating_add(*size);
                new_resource_count += 1;
            }
        }

        let is_report_day = *date == report_day;
        let mut deleted_bytes = 0u64;
        let mut deleted_resource_count = 0;
        let mut held_back_bytes = 0u64;
        for name in seen.iter().filter(|name| !sizes.contains_key(*name)) {
            if is_report_day {
                held_back_bytes = held_back_bytes.saturating_add(known(name));
            } else {
                deleted_bytes = deleted_bytes.saturating_add(known(name));
                deleted_resource_count += 1;
            }
        }

        let total_protected_bytes = sizes
            .values()
            .fold(held_back_bytes, |sum, size| sum.saturating_add(*size));

        seen.extend(sizes.keys().copied());

        baselines.push(DailyBaseline {
            date: *date,
            modified_bytes,
            new_bytes,
            deleted_bytes,
            suspicious_bytes,
            total_protected_bytes,
            resource_count: sizes.len(),
            new_resource_count,
            deleted_resource_count,
        });
    }

    baselines
}
