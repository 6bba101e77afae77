//! Per-resource report rows

use std::collections::BTreeSet;

use tracing::debug;

use super::lookup::SizeCache;
use crate::baseline::{change_pct, Current, WindowStats};
use crate::models::{JobSource, ResourceReport};

/// Build one report row per resource in the current window, sorted by name.
///
/// The authoritative size is the window's own mean size when jobs reported
/// one, otherwise whatever `sizes` resolves. A resource is classified as
/// vault when any vault job names it.
pub fn aggregate(
    current: &WindowStats<Current>,
    vault_resources: &BTreeSet<&str>,
    sizes: &mut SizeCache<'_>,
) -> Vec<ResourceReport> {
    let mut reports = Vec::with_capacity(current.len());

    for stats in current.iter() {
        let own_size = stats.avg_total_resource_size_bytes.round() as u64;
        let (size, size_from_lookup) = if own_size > 0 {
            (own_size, false)
        } else {
            let resolved = sizes.resolve(
                &stats.resource_name,
                &stats.resource_type,
                stats.project_id.as_deref(),
            );
            (resolved, resolved > 0)
        };

        let source = if vault_resources.contains(stats.resource_name.as_str()) {
            JobSource::Vault
        } else {
            JobSource::Appliance
        };

        reports.push(ResourceReport {
            resource_name: stats.resource_name.clone(),
            resource_type: stats.resource_type.clone(),
            source,
            total_resource_size_bytes: size,
            size_from_lookup,
            daily_change_bytes: stats.avg_bytes_transferred,
            daily_change_pct: change_pct(stats.avg_bytes_transferred, size as f64),
            job_count: stats.data_point_count,
            avg_duration_seconds: stats.avg_duration_seconds,
            stdev_bytes_transferred: stats.stdev_bytes_transferred,
        });
    }

    debug!(
        resources = reports.len(),
        from_lookup = reports.iter().filter(|r| r.size_from_lookup).count(),
        "Aggregated resource reports"
    );
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::Baseline;
    use crate::error::LookupError;
    use crate::models::{JobRecord, JobStatus, BYTES_PER_GIB};
    use crate::report::lookup::{InventoryFile, SizeLookup};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    struct FixedLookup(u64);

    impl SizeLookup for FixedLookup {
        fn lookup(&self, name: &str, _: &str, _: Option<&str>) -> Result<u64, LookupError> {
            if name == "broken" {
                Err(LookupError::Unavailable("offline".to_string()))
            } else {
                Ok(self.0)
            }
        }
    }

    fn boundary() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap()
    }

    fn record(id: &str, resource: &str, size: u64, bytes: u64, source: JobSource) -> JobRecord {
        JobRecord {
            job_id: id.to_string(),
            status: JobStatus::Successful,
            final_status: JobStatus::Successful,
            resource_name: resource.to_string(),
            resource_type: "GCE".to_string(),
            bytes_transferred: bytes,
            total_resource_size_bytes: size,
            duration_seconds: 30,
            timestamp: boundary() + Duration::hours(2),
            source,
            project_id: None,
        }
    }

    #[test]
    fn test_own_size_wins_over_lookup() {
        let records = vec![record("1", "vm-a", 10 * BYTES_PER_GIB, BYTES_PER_GIB, JobSource::Vault)];
        let baseline = Baseline::calculate(&records, boundary());
        let lookup = FixedLookup(999);
        let mut cache = SizeCache::new(&lookup);

        let reports = aggregate(&baseline.current, &BTreeSet::from(["vm-a"]), &mut cache);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].total_resource_size_bytes, 10 * BYTES_PER_GIB);
        assert!(!reports[0].size_from_lookup);
        assert!((reports[0].daily_change_pct - 10.0).abs() < 1e-9);
        assert_eq!(reports[0].source, JobSource::Vault);
    }

    #[test]
    fn test_missing_size_is_looked_up_and_pct_recomputed() {
        let records = vec![record("1", "vm-b", 0, BYTES_PER_GIB, JobSource::Appliance)];
        let baseline = Baseline::calculate(&records, boundary());
        let lookup = FixedLookup(4 * BYTES_PER_GIB);
        let mut cache = SizeCache::new(&lookup);

        let reports = aggregate(&baseline.current, &BTreeSet::new(), &mut cache);
        assert_eq!(reports[0].total_resource_size_bytes, 4 * BYTES_PER_GIB);
        assert!(reports[0].size_from_lookup);
        assert!((reports[0].daily_change_pct - 25.0).abs() < 1e-9);
        assert_eq!(reports[0].source, JobSource::Appliance);
    }

    #[test]
    fn test_lookup_failure_does_not_stop_other_resources() {
        let records = vec![
            record("1", "broken", 0, 5, JobSource::Appliance),
            record("2", "vm-c", 0, 5, JobSource::Appliance),
        ];
        let baseline = Baseline::calculate(&records, boundary());
        let lookup = FixedLookup(100);
        let mut cache = SizeCache::new(&lookup);

        let reports = aggregate(&baseline.current, &BTreeSet::new(), &mut cache);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].resource_name, "broken");
        assert_eq!(reports[0].total_resource_size_bytes, 0);
        assert_eq!(reports[0].daily_change_pct, 0.0);
        assert_eq!(reports[1].total_resource_size_bytes, 100);
        assert_eq!(cache.failures(), 1);
    }

    #[test]
    fn test_lookup_uses_logging_project() {
        let mut job = record("1", "web-server-1", 0, BYTES_PER_GIB, JobSource::Appliance);
        job.project_id = Some("staging".to_string());
        let baseline = Baseline::calculate(&[job], boundary());
        let inventory = InventoryFile::from_json(
            r#"{"instances": {"web-server-1": 120, "staging/web-server-1": 40}}"#,
        )
        .unwrap();
        let mut cache = SizeCache::new(&inventory);

        let reports = aggregate(&baseline.current, &BTreeSet::new(), &mut cache);
        assert_eq!(reports[0].total_resource_size_bytes, 40 * BYTES_PER_GIB);
        assert_eq!(cache.failures(), 0);
    }
}
