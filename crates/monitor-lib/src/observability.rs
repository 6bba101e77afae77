//! Observability infrastructure for the backup monitor
//!
//! Provides:
//! - Prometheus metrics describing the last analysis run
//! - Structured JSON logging with tracing

use prometheus::{register_histogram, register_int_gauge, Encoder, Histogram, IntGauge, TextEncoder};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::anomaly::AnomalyReason;
use crate::models::Anomaly;
use crate::pipeline::AnalysisReport;

/// Histogram buckets for analysis latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    analysis_latency_seconds: Histogram,
    jobs_analyzed: IntGauge,
    anomalies_detected: IntGauge,
    malformed_events: IntGauge,
    missing_job_ids: IntGauge,
    fallback_representatives: IntGauge,
    lookup_failures: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            analysis_latency_seconds: register_histogram!(
                "gcbdr_monitor_analysis_latency_seconds",
                "Time spent analysing one batch of backup events",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            jobs_analyzed: register_int_gauge!(
                "gcbdr_monitor_jobs_analyzed",
                "Reconciled jobs in the last analysis run"
            )
            .expect("Failed to register jobs_analyzed"),

            anomalies_detected: register_int_gauge!(
                "gcbdr_monitor_anomalies_detected",
                "Anomalies reported by the last analysis run"
            )
            .expect("Failed to register anomalies_detected"),

            malformed_events: register_int_gauge!(
                "gcbdr_monitor_malformed_events",
                "Events skipped as malformed in the last analysis run"
            )
            .expect("Failed to register malformed_events"),

            missing_job_ids: register_int_gauge!(
                "gcbdr_monitor_missing_job_ids",
                "Events dropped for lacking a job id in the last analysis run"
            )
            .expect("Failed to register missing_job_ids"),

            fallback_representatives: register_int_gauge!(
                "gcbdr_monitor_fallback_representatives",
                "Jobs reconciled from their latest event in the last analysis run"
            )
            .expect("Failed to register fallback_representatives"),

            lookup_failures: register_int_gauge!(
                "gcbdr_monitor_size_lookup_failures",
                "Failed resource size lookups in the last analysis run"
            )
            .expect("Failed to register lookup_failures"),
        }
    }
}

fn gauge_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    /// Publish the counters of one finished run
    pub fn record(&self, report: &AnalysisReport) {
        let inner = self.inner();
        let diagnostics = &report.diagnostics;
        inner.jobs_analyzed.set(gauge_value(report.job_counts.total));
        inner.anomalies_detected.set(gauge_value(report.anomalies.len()));
        inner
            .malformed_events
            .set(gauge_value(diagnostics.malformed_events));
        inner
            .missing_job_ids
            .set(gauge_value(diagnostics.missing_job_id));
        inner
            .fallback_representatives
            .set(gauge_value(diagnostics.fallback_representatives));
        inner
            .lookup_failures
            .set(gauge_value(diagnostics.lookup_failures));
    }

    /// Text exposition of every registered metric
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for analysis runs
///
/// Emits event-named records so runs can be followed in JSON logs.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    scope: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("gcbdr")
    }
}

impl StructuredLogger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn log_run_started(&self, events: usize, filter: Option<&str>) {
        info!(
            event = "analysis_started",
            scope = %self.scope,
            events = events,
            filter = ?filter,
            "Backup job analysis started"
        );
    }

    /// Log a flagged job. Drop-offs log at warn level.
    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        let reasons: Vec<String> = anomaly.reasons.iter().map(ToString::to_string).collect();
        let reasons = reasons.join(", ");
        let drop_off = anomaly
            .reasons
            .iter()
            .any(|r| matches!(r, AnomalyReason::SizeDropOff { .. }));

        if drop_off {
            warn!(
                event = "anomaly_detected",
                scope = %self.scope,
                job_id = %anomaly.job_id,
                resource = %anomaly.resource_name,
                bytes_transferred = anomaly.bytes_transferred,
                avg_bytes_transferred = anomaly.avg_bytes_transferred,
                reasons = %reasons,
                "Backup size dropped off"
            );
        } else {
            info!(
                event = "anomaly_detected",
                scope = %self.scope,
                job_id = %anomaly.job_id,
                resource = %anomaly.resource_name,
                bytes_transferred = anomaly.bytes_transferred,
                avg_bytes_transferred = anomaly.avg_bytes_transferred,
                duration_seconds = anomaly.duration_seconds,
                reasons = %reasons,
                "Anomaly detected"
            );
        }
    }

    pub fn log_run_complete(&self, report: &AnalysisReport, elapsed_secs: f64) {
        info!(
            event = "analysis_complete",
            scope = %self.scope,
            jobs = report.job_counts.total,
            resources = report.resource_reports.len(),
            anomalies = report.anomalies.len(),
            malformed_events = report.diagnostics.malformed_events,
            lookup_failures = report.diagnostics.lookup_failures,
            elapsed_secs = elapsed_secs,
            "Backup job analysis complete"
        );
    }
}
