//! Core data models for the backup job monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes in one GiB. Every GiB-denominated field is converted through this.
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Bytes in one MiB
pub const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Convert a GiB quantity to whole bytes. Negative and non-finite inputs map to 0.
pub fn gib_to_bytes(gib: f64) -> u64 {
    if !gib.is_finite() || gib <= 0.0 {
        return 0;
    }
    (gib * BYTES_PER_GIB as f64).round() as u64
}

/// Lifecycle status of a job as reported by one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Skipped,
    Successful,
    Failed,
    Unknown,
}

/// Reconciliation priority. The highest rank seen for a job wins.
const STATUS_RANK: [(JobStatus, u8); 5] = [
    (JobStatus::Unknown, 0),
    (JobStatus::Running, 1),
    (JobStatus::Skipped, 2),
    (JobStatus::Successful, 3),
    (JobStatus::Failed, 4),
];

impl JobStatus {
    pub fn rank(self) -> u8 {
        STATUS_RANK
            .iter()
            .find(|(status, _)| *status == self)
            .map(|(_, rank)| *rank)
            .unwrap_or(0)
    }

    /// Parse a status string as written by the upstream log schemas
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESSFUL" | "SUCCESS" | "SUCCEEDED" | "OK" => JobStatus::Successful,
            "FAILED" | "FAILURE" | "ERROR" => JobStatus::Failed,
            "RUNNING" | "STARTED" | "IN_PROGRESS" => JobStatus::Running,
            "SKIPPED" => JobStatus::Skipped,
            _ => JobStatus::Unknown,
        }
    }

    /// Infer a status from a free-form log message
    pub fn infer_from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if ["succeeded", "finished", "completed"]
            .iter()
            .any(|word| message.contains(word))
        {
            JobStatus::Successful
        } else if message.contains("failed") || message.contains("error") {
            JobStatus::Failed
        } else if message.contains("running") || message.contains("started") {
            JobStatus::Running
        } else {
            JobStatus::Unknown
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Skipped => write!(f, "SKIPPED"),
            JobStatus::Successful => write!(f, "SUCCESSFUL"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Which backup product reported a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    Vault,
    Appliance,
}

impl fmt::Display for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSource::Vault => write!(f, "vault"),
            JobSource::Appliance => write!(f, "appliance"),
        }
    }
}

/// One observation derived from a single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub resource_name: String,
    pub resource_type: String,
    pub bytes_transferred: u64,
    /// 0 when unknown
    pub total_resource_size_bytes: u64,
    pub duration_seconds: u32,
    pub timestamp: DateTime<Utc>,
    pub source: JobSource,
    /// Project the job was logged in, when the log entry said
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// The reconciled outcome of one logical job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    /// Status of the representative event
    pub status: JobStatus,
    pub final_status: JobStatus,
    pub resource_name: String,
    pub resource_type: String,
    pub bytes_transferred: u64,
    pub total_resource_size_bytes: u64,
    pub duration_seconds: u32,
    pub timestamp: DateTime<Utc>,
    pub source: JobSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl JobRecord {
    /// Build a record from the representative event of a job
    pub(crate) fn from_representative(
        job_id: String,
        event: &JobEvent,
        final_status: JobStatus,
    ) -> Self {
        Self {
            job_id,
            status: event.status,
            final_status,
            resource_name: event.resource_name.clone(),
            resource_type: event.resource_type.clone(),
            bytes_transferred: event.bytes_transferred,
            total_resource_size_bytes: event.total_resource_size_bytes,
            duration_seconds: event.duration_seconds,
            timestamp: event.timestamp,
            source: event.source,
            project_id: event.project_id.clone(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.final_status == JobStatus::Successful
    }
}

/// One flagged job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub job_id: String,
    pub resource_name: String,
    pub resource_type: String,
    pub bytes_transferred: u64,
    pub avg_bytes_transferred: f64,
    pub duration_seconds: u32,
    pub avg_duration_seconds: f64,
    pub total_resource_size_bytes: u64,
    pub timestamp: DateTime<Utc>,
    pub reasons: Vec<crate::anomaly::AnomalyReason>,
}

/// One row of the per-resource report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    pub resource_name: String,
    pub resource_type: String,
    pub source: JobSource,
    pub total_resource_size_bytes: u64,
    /// True when the size came from the inventory lookup rather than job events
    pub size_from_lookup: bool,
    pub daily_change_bytes: f64,
    pub daily_change_pct: f64,
    pub job_count: usize,
    pub avg_duration_seconds: f64,
    pub stdev_bytes_transferred: f64,
}

/// Job tallies over the reconciled records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub other: usize,
}

impl JobCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.total += 1;
            match record.final_status {
                JobStatus::Successful => counts.successful += 1,
                JobStatus::Failed => counts.failed += 1,
                _ => counts.other += 1,
            }
        }
        counts
    }
}
