//! Cross-source size enrichment
//!
//! Appliance events often report zero sizes. A secondary job log keyed by
//! the same job name usually has them, so zero fields are filled from it.
//! A non-zero value is never overwritten.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::JobRecord;

/// Size fields carried by the secondary source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSizes {
    pub total_resource_size_bytes: u64,
    pub bytes_transferred: u64,
}

/// One normalized secondary-source entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentEntry {
    pub job_name: String,
    pub sizes: EnrichmentSizes,
}

/// Job name -> sizes lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentTable {
    entries: BTreeMap<String, EnrichmentSizes>,
}

impl EnrichmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; a later entry for the same job name replaces the earlier one
    pub fn insert(&mut self, entry: EnrichmentEntry) {
        self.entries.insert(entry.job_name, entry.sizes);
    }

    /// Merge `other` into this table, `other` winning on conflicts
    pub fn merge(&mut self, other: &EnrichmentTable) {
        for (name, sizes) in &other.entries {
            self.entries.insert(name.clone(), *sizes);
        }
    }

    pub fn get(&self, job_name: &str) -> Option<&EnrichmentSizes> {
        self.entries.get(job_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<EnrichmentEntry> for EnrichmentTable {
    fn from_iter<T: IntoIterator<Item = EnrichmentEntry>>(iter: T) -> Self {
        let mut table = Self::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

/// Counts from one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentOutcome {
    /// Records that received at least one field
    pub enriched: usize,
    /// Records with no entry in the table
    pub unmatched: usize,
}

/// Copy a size only into a zero field, and only a non-zero value
fn fill(field: &mut u64, value: u64) -> bool {
    if *field == 0 && value > 0 {
        *field = value;
        true
    } else {
        false
    }
}

/// Fill zero size fields of `records` from `table`, matching job id to job name
pub fn enrich<'a, I>(records: I, table: &EnrichmentTable) -> EnrichmentOutcome
where
    I: IntoIterator<Item = &'a mut JobRecord>,
{
    let mut outcome = EnrichmentOutcome::default();

    for record in records {
        let Some(sizes) = table.get(&record.job_id) else {
            outcome.unmatched += 1;
            continue;
        };

        let total = fill(
            &mut record.total_resource_size_bytes,
            sizes.total_resource_size_bytes,
        );
        let transferred = fill(&mut record.bytes_transferred, sizes.bytes_transferred);
        if total || transferred {
            outcome.enriched += 1;
            debug!(
                job_id = %record.job_id,
                total_resource_size_bytes = record.total_resource_size_bytes,
                bytes_transferred = record.bytes_transferred,
                "Enriched job from secondary source"
            );
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobSource, JobStatus};
    use chrono::{TimeZone, Utc};

    fn record(job_id: &str, total: u64, bytes: u64) -> JobRecord {
        JobRecord {
            job_id: job_id.to_string(),
            status: JobStatus::Successful,
            final_status: JobStatus::Successful,
            resource_name: "app-1".to_string(),
            resource_type: "SqlServerWriter".to_string(),
            bytes_transferred: bytes,
            total_resource_size_bytes: total,
            duration_seconds: 0,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap(),
            source: JobSource::Appliance,
            project_id: None,
        }
    }

    fn table(name: &str, total: u64, bytes: u64) -> EnrichmentTable {
        [EnrichmentEntry {
            job_name: name.to_string(),
            sizes: EnrichmentSizes {
                total_resource_size_bytes: total,
                bytes_transferred: bytes,
            },
        }]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_fills_zero_fields() {
        let mut records = vec![record("Job_1", 0, 0)];
        let outcome = enrich(&mut records, &table("Job_1", 500, 40));
        assert_eq!(records[0].total_resource_size_bytes, 500);
        assert_eq!(records[0].bytes_transferred, 40);
        assert_eq!(outcome.enriched, 1);
    }

    #[test]
    fn test_never_overwrites_non_zero() {
        let mut records = vec![record("Job_1", 5, 7)];
        let outcome = enrich(&mut records, &table("Job_1", 500, 40));
        assert_eq!(records[0].total_resource_size_bytes, 5);
        assert_eq!(records[0].bytes_transferred, 7);
        assert_eq!(outcome.enriched, 0);
    }

    #[test]
    fn test_zero_lookup_value_leaves_field() {
        let mut records = vec![record("Job_1", 0, 0)];
        enrich(&mut records, &table("Job_1", 0, 40));
        assert_eq!(records[0].total_resource_size_bytes, 0);
        assert_eq!(records[0].bytes_transferred, 40);
    }

    #[test]
    fn test_missing_entry_is_not_an_error() {
        let mut records = vec![record("Job_2", 0, 0)];
        let outcome = enrich(&mut records, &table("Job_1", 500, 40));
        assert_eq!(records[0], record("Job_2", 0, 0));
        assert_eq!(outcome.unmatched, 1);
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = table("Job_1", 1, 1);
        base.merge(&table("Job_1", 2, 2));
        assert_eq!(base.get("Job_1").map(|s| s.bytes_transferred), Some(2));
        assert_eq!(base.len(), 1);
    }
}
