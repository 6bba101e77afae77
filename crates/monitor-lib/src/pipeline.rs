//! End-to-end analysis of one batch of backup events
//!
//! normalize -> reconcile -> enrich -> baseline -> detect -> aggregate -> filter
//!
//! The pass is synchronous and allocates all of its state per call, so the
//! same events, boundary and filter always produce the same report.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::anomaly::AnomalyDetector;
use crate::baseline::{change_pct, daily_baselines, partition, Baseline, DailyBaseline};
use crate::config::AnalysisConfig;
use crate::enricher::{enrich, EnrichmentTable};
use crate::models::{Anomaly, JobCounts, JobEvent, JobRecord, JobSource, ResourceReport};
use crate::normalizer::{normalize, Normalized};
use crate::observability::StructuredLogger;
use crate::reconciler::reconcile;
use crate::report::{aggregate, NameFilter, NoLookup, SizeCache, SizeLookup};
use crate::source::RawEvent;

/// Fleet-wide totals over the filtered output
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub vault_jobs: usize,
    pub appliance_jobs: usize,
    pub anomaly_count: usize,
    pub total_resource_size_bytes: u64,
    pub daily_change_bytes: f64,
    pub daily_change_pct: f64,
    /// Vault resources whose size stayed unknown
    pub zero_size_vault_count: usize,
    pub vault_resource_count: usize,
}

impl Summary {
    fn compute(records: &[&JobRecord], reports: &[ResourceReport], anomalies: &[Anomaly]) -> Self {
        let mut summary = Summary {
            anomaly_count: anomalies.len(),
            ..Summary::default()
        };

        for record in records {
            match record.source {
                JobSource::Vault => summary.vault_jobs += 1,
                JobSource::Appliance => summary.appliance_jobs += 1,
            }
        }

        for report in reports {
            summary.total_resource_size_bytes = summary
                .total_resource_size_bytes
                .saturating_add(report.total_resource_size_bytes);
            summary.daily_change_bytes += report.daily_change_bytes;
            if report.source == JobSource::Vault {
                summary.vault_resource_count += 1;
                if report.total_resource_size_bytes == 0 {
                    summary.zero_size_vault_count += 1;
                }
            }
        }
        summary.daily_change_pct = change_pct(
            summary.daily_change_bytes,
            summary.total_resource_size_bytes as f64,
        );
        summary
    }
}

/// Counters for everything the run skipped, dropped or patched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub malformed_events: usize,
    pub missing_job_id: usize,
    pub fallback_representatives: usize,
    pub enriched_jobs: usize,
    pub unmatched_enrichment: usize,
    pub lookup_failures: usize,
}

/// Output of one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub resource_reports: Vec<ResourceReport>,
    pub anomalies: Vec<Anomaly>,
    pub job_counts: JobCounts,
    pub summary: Summary,
    pub daily_baselines: Vec<DailyBaseline>,
    pub diagnostics: Diagnostics,
}

/// Runs the analysis pipeline with fixed settings and collaborators
pub struct Analyzer {
    config: AnalysisConfig,
    lookup: Arc<dyn SizeLookup>,
    enrichment: EnrichmentTable,
    logger: StructuredLogger,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            lookup: Arc::new(NoLookup),
            enrichment: EnrichmentTable::new(),
            logger: StructuredLogger::default(),
        }
    }

    pub fn with_size_lookup(mut self, lookup: Arc<dyn SizeLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Enrichment entries known before the batch; the batch's own entries
    /// take precedence
    pub fn with_enrichment_table(mut self, table: EnrichmentTable) -> Self {
        self.enrichment = table;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse `events`. Jobs after `boundary` are evaluated against the
    /// history at or before it. `filter` restricts every output to matching
    /// resource names.
    pub fn analyze(
        &self,
        events: &[RawEvent],
        boundary: DateTime<Utc>,
        filter: Option<&str>,
    ) -> AnalysisReport {
        let started = Instant::now();
        self.logger.log_run_started(events.len(), filter);
        let mut diagnostics = Diagnostics::default();

        let mut job_events: Vec<JobEvent> = Vec::with_capacity(events.len());
        let mut batch_enrichment = EnrichmentTable::new();
        for event in events {
            match normalize(event) {
                Ok(Normalized::Job(job)) => job_events.push(job),
                Ok(Normalized::Enrichment(entry)) => batch_enrichment.insert(entry),
                Err(error) => {
                    diagnostics.malformed_events += 1;
                    debug!(kind = %event.kind, error = %error, "Skipping malformed event");
                }
            }
        }

        let reconciliation = reconcile(&job_events);
        diagnostics.missing_job_id = reconciliation.missing_job_id;
        diagnostics.fallback_representatives = reconciliation.fallback_representatives;
        let mut records = reconciliation.records;

        if self.config.enrich_appliance_jobs {
            let mut table = self.enrichment.clone();
            table.merge(&batch_enrichment);
            let outcome = enrich(
                records
                    .iter_mut()
                    .filter(|r| r.source == JobSource::Appliance),
                &table,
            );
            diagnostics.enriched_jobs = outcome.enriched;
            diagnostics.unmatched_enrichment = outcome.unmatched;
        }

        let split = partition(&records, boundary);
        let baseline = Baseline::from_partition(&split);
        let detector = AnomalyDetector::new(self.config.thresholds.clone());
        let anomalies = detector.detect(split.current.iter().copied(), &baseline.history);

        let vault_resources: BTreeSet<&str> = records
            .iter()
            .filter(|r| r.source == JobSource::Vault)
            .map(|r| r.resource_name.as_str())
            .collect();
        let mut sizes = SizeCache::new(self.lookup.as_ref());
        let reports = aggregate(&baseline.current, &vault_resources, &mut sizes);
        diagnostics.lookup_failures = sizes.failures();

        let name_filter = NameFilter::parse(filter);
        let resource_reports: Vec<ResourceReport> = reports
            .into_iter()
            .filter(|r| name_filter.matches(&r.resource_name))
            .collect();
        let anomalies: Vec<Anomaly> = anomalies
            .into_iter()
            .filter(|a| name_filter.matches(&a.resource_name))
            .collect();
        let filtered: Vec<&JobRecord> = records
            .iter()
            .filter(|r| name_filter.matches(&r.resource_name))
            .collect();

        // History means first, then the authoritative report sizes
        let mut known_sizes: BTreeMap<String, u64> = BTreeMap::new();
        for stats in baseline.history.iter() {
            let size = stats.avg_total_resource_size_bytes.round() as u64;
            if size > 0 {
                known_sizes.insert(stats.resource_name.clone(), size);
            }
        }
        for report in resource_reports.iter().filter(|r| r.total_resource_size_bytes > 0) {
            known_sizes.insert(report.resource_name.clone(), report.total_resource_size_bytes);
        }
        let report_day = (boundary + Duration::days(1)).date_naive();
        let daily = daily_baselines(filtered.iter().copied(), &anomalies, &known_sizes, report_day);

        for anomaly in &anomalies {
            self.logger.log_anomaly(anomaly);
        }

        let report = AnalysisReport {
            job_counts: JobCounts::tally(filtered.iter().copied()),
            summary: Summary::compute(&filtered, &resource_reports, &anomalies),
            resource_reports,
            anomalies,
            daily_baselines: daily,
            diagnostics,
        };
        self.logger
            .log_run_complete(&report, started.elapsed().as_secs_f64());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::models::BYTES_PER_GIB;
    use crate::source::EventKind;
    use chrono::TimeZone;
    use serde_json::json;

    fn boundary() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap()
    }

    fn vault(job_id: &str, resource: &str, bytes: u64, hours: i64) -> RawEvent {
        RawEvent::new(
            EventKind::Vault,
            boundary() + Duration::hours(hours),
            json!({
                "jobId": job_id,
                "jobStatus": "SUCCESSFUL",
                "resourceType": "Cloud SQL",
                "sourceResourceName": resource,
                "bytesTransferred": bytes,
                "sourceResourceSizeBytes": 10 * BYTES_PER_GIB,
            }),
        )
    }

    fn appliance(job_name: &str, host: &str, hours: i64) -> RawEvent {
        RawEvent::new(
            EventKind::Appliance,
            boundary() + Duration::hours(hours),
            json!({ "jobName": job_name, "appName": host, "appType": "SqlServerWriter" }),
        )
    }

    fn enrichment(job_name: &str, total_gib: f64, copied_gib: f64) -> RawEvent {
        RawEvent::new(
            EventKind::Enrichment,
            boundary(),
            json!({
                "job_name": job_name,
                "resource_data_size_in_gib": total_gib,
                "data_copied_in_gib": copied_gib,
            }),
        )
    }

    #[test]
    fn test_malformed_events_are_counted_not_fatal() {
        let events = vec![
            RawEvent::new(EventKind::Vault, boundary(), json!({})),
            RawEvent::new(EventKind::Vault, boundary(), serde_json::Value::Null),
            vault("a", "db", 100, -2),
        ];
        let report = Analyzer::default().analyze(&events, boundary(), None);
        assert_eq!(report.diagnostics.malformed_events, 2);
        assert_eq!(report.job_counts.total, 1);
    }

    #[test]
    fn test_spike_is_reported() {
        let events = vec![
            vault("h1", "db", 100, -48),
            vault("h2", "db", 100, -24),
            vault("c1", "db", 300, 2),
        ];
        let report = Analyzer::default().analyze(&events, boundary(), None);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].job_id, "c1");
        assert_eq!(report.anomalies[0].reasons[0].to_string(), "Size Spike (3.0x avg)");
        assert_eq!(report.summary.anomaly_count, 1);
        assert_eq!(report.resource_reports.len(), 1);
        assert_eq!(report.resource_reports[0].source, JobSource::Vault);
        assert_eq!(report.summary.vault_jobs, 3);
    }

    #[test]
    fn test_appliance_records_are_enriched_batch_first() {
        let mut external = EnrichmentTable::new();
        external.insert(crate::enricher::EnrichmentEntry {
            job_name: "Job_1".to_string(),
            sizes: crate::enricher::EnrichmentSizes {
                total_resource_size_bytes: 1,
                bytes_transferred: 1,
            },
        });
        let events = vec![appliance("Job_1", "sql-host", 3), enrichment("Job_1", 2.0, 0.5)];

        let report = Analyzer::default()
            .with_enrichment_table(external)
            .analyze(&events, boundary(), None);
        assert_eq!(report.diagnostics.enriched_jobs, 1);
        let row = &report.resource_reports[0];
        assert_eq!(row.total_resource_size_bytes, 2 * BYTES_PER_GIB);
        assert_eq!(row.daily_change_bytes, (BYTES_PER_GIB / 2) as f64);
        assert_eq!(row.source, JobSource::Appliance);
    }

    #[test]
    fn test_enrichment_can_be_disabled() {
        let config = AnalysisConfig {
            enrich_appliance_jobs: false,
            ..AnalysisConfig::default()
        };
        let events = vec![appliance("Job_1", "sql-host", 3), enrichment("Job_1", 2.0, 0.5)];
        let report = Analyzer::new(config).analyze(&events, boundary(), None);
        assert_eq!(report.diagnostics.enriched_jobs, 0);
        assert_eq!(report.resource_reports[0].total_resource_size_bytes, 0);
    }

    struct FailingLookup;

    impl SizeLookup for FailingLookup {
        fn lookup(&self, name: &str, _: &str, _: Option<&str>) -> Result<u64, LookupError> {
            Err(LookupError::NotFound {
                name: name.to_string(),
            })
        }
    }

    #[test]
    fn test_lookup_failures_are_counted() {
        let events = vec![appliance("Job_1", "host-a", 1), appliance("Job_2", "host-b", 2)];
        let report = Analyzer::default()
            .with_size_lookup(Arc::new(FailingLookup))
            .analyze(&events, boundary(), None);
        assert_eq!(report.resource_reports.len(), 2);
        assert_eq!(report.diagnostics.lookup_failures, 2);
        assert_eq!(report.summary.total_resource_size_bytes, 0);
    }

    #[test]
    fn test_filter_applies_to_every_output() {
        let events = vec![
            vault("h1", "prod-sql-db-1", 100, -24),
            vault("c1", "prod-sql-db-1", 500, 2),
            vault("h2", "web-server-1", 100, -24),
            vault("c2", "web-server-1", 500, 2),
        ];
        let report = Analyzer::default().analyze(&events, boundary(), Some("*server*"));
        assert_eq!(report.resource_reports.len(), 1);
        assert_eq!(report.resource_reports[0].resource_name, "web-server-1");
        assert!(report
            .anomalies
            .iter()
            .all(|a| a.resource_name == "web-server-1"));
        assert_eq!(report.job_counts.total, 2);
        assert_eq!(report.summary.vault_jobs, 2);
    }

    #[test]
    fn test_report_day_follows_boundary() {
        let events = vec![
            vault("h1", "db-a", 1, -30),
            vault("h2", "db-b", 1, -30),
            vault("c1", "db-a", 1, 30),
        ];
        let report = Analyzer::default().analyze(&events, boundary(), None);
        let last = report.daily_baselines.last().unwrap();
        assert_eq!(last.date, (boundary() + Duration::days(1)).date_naive());
        assert_eq!(last.deleted_resource_count, 0);
        assert_eq!(last.total_protected_bytes, 20 * BYTES_PER_GIB);
    }
}
