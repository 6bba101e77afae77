//! Typed payload schemas, one per event kind
//!
//! Upstream schemas vary by job category, so size fields are resolved
//! through ordered cascades: a later field is consulted only when every
//! earlier one is absent or zero.

use chrono::DateTime;
use serde::Deserialize;

use crate::models::gib_to_bytes;

/// A numeric field that may arrive as a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn value(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    fn as_bytes(&self) -> Option<u64> {
        self.value().filter(|v| *v > 0.0).map(|v| v.round() as u64)
    }

    fn gib_as_bytes(&self) -> Option<u64> {
        self.value().map(gib_to_bytes)
    }
}

/// An identifier that may arrive as a string or a number.
///
/// Integers are kept exact; only non-integral numbers fall through to `f64`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Identifier {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Identifier {
    fn into_string(self) -> Option<String> {
        let id = match self {
            Identifier::Text(s) => s.trim().to_string(),
            Identifier::Unsigned(n) => n.to_string(),
            Identifier::Signed(n) => n.to_string(),
            Identifier::Float(n) => n.to_string(),
        };
        (!id.is_empty()).then_some(id)
    }
}

/// First candidate that is present and non-zero, else 0
fn first_non_zero<I>(candidates: I) -> u64
where
    I: IntoIterator<Item = Option<u64>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|v| *v > 0)
        .unwrap_or(0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

const UNKNOWN_RESOURCE: &str = "unknown-resource";

/// Protected-resource size fields shared by vault and appliance payloads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct SizeFields {
    source_resource_size_bytes: Option<Numeric>,
    used_storage_gib: Option<Numeric>,
    source_resource_data_size_gib: Option<Numeric>,
}

impl SizeFields {
    fn total_bytes(&self) -> u64 {
        first_non_zero([
            self.source_resource_size_bytes.as_ref().and_then(Numeric::as_bytes),
            self.used_storage_gib.as_ref().and_then(Numeric::gib_as_bytes),
            self.source_resource_data_size_gib
                .as_ref()
                .and_then(Numeric::gib_as_bytes),
        ])
    }
}

/// Top-level size fields, falling back to `protectedResourceDetails`
fn resolve_total_size(top: &SizeFields, nested: Option<&SizeFields>) -> u64 {
    match top.total_bytes() {
        0 => nested.map(SizeFields::total_bytes).unwrap_or(0),
        bytes => bytes,
    }
}

/// Timing fields used to derive a job's duration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct TimingFields {
    start_time: Option<String>,
    end_time: Option<String>,
    event_time: Option<String>,
    duration_seconds: Option<Numeric>,
}

impl TimingFields {
    fn duration_seconds(&self) -> u32 {
        let parse = |s: &Option<String>| {
            s.as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        };
        let start = parse(&self.start_time).or_else(|| parse(&self.event_time));
        let end = parse(&self.end_time).or_else(|| parse(&self.event_time));

        let seconds = match (start, end) {
            (Some(start), Some(end)) if end > start => {
                (end - start).num_milliseconds() as f64 / 1000.0
            }
            _ => self
                .duration_seconds
                .as_ref()
                .and_then(Numeric::value)
                .unwrap_or(0.0),
        };

        if seconds <= 0.0 {
            0
        } else {
            seconds.round().min(u32::MAX as f64) as u32
        }
    }
}

/// Fields every job-producing payload resolves to
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedJob {
    pub job_id: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub resource_name: String,
    pub resource_type: String,
    pub bytes_transferred: u64,
    pub total_resource_size_bytes: u64,
    pub duration_seconds: u32,
}

/// Backup/restore job log entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct VaultJobPayload {
    job_id: Option<Identifier>,
    source_resource_name: Option<String>,
    resource_type: Option<String>,
    job_status: Option<String>,
    message: Option<String>,
    bytes_transferred: Option<Numeric>,
    incremental_backup_size_gib: Option<Numeric>,
    #[serde(flatten)]
    sizes: SizeFields,
    protected_resource_details: Option<SizeFields>,
    #[serde(flatten)]
    timing: TimingFields,
}

impl VaultJobPayload {
    pub fn resolve(self) -> ResolvedJob {
        ResolvedJob {
            bytes_transferred: first_non_zero([
                self.bytes_transferred.as_ref().and_then(Numeric::as_bytes),
                self.incremental_backup_size_gib
                    .as_ref()
                    .and_then(Numeric::gib_as_bytes),
            ]),
            total_resource_size_bytes: resolve_total_size(
                &self.sizes,
                self.protected_resource_details.as_ref(),
            ),
            duration_seconds: self.timing.duration_seconds(),
            job_id: self.job_id.and_then(Identifier::into_string),
            status: non_empty(self.job_status),
            message: self.message,
            resource_name: non_empty(self.source_resource_name)
                .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string()),
            resource_type: non_empty(self.resource_type).unwrap_or_default(),
        }
    }
}

/// Appliance "backup succeeded" event
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ApplianceEventPayload {
    job_name: Option<Identifier>,
    srcid: Option<Identifier>,
    app_name: Option<String>,
    app_type: Option<String>,
    error_message: Option<String>,
    data_copied_in_bytes: Option<Numeric>,
    bytes_written: Option<Numeric>,
    transfer_size: Option<Numeric>,
    #[serde(flatten)]
    sizes: SizeFields,
    protected_resource_details: Option<SizeFields>,
    #[serde(flatten)]
    timing: TimingFields,
}

impl ApplianceEventPayload {
    pub fn resolve(self) -> ResolvedJob {
        let job_id = self
            .job_name
            .and_then(Identifier::into_string)
            .or_else(|| self.srcid.and_then(Identifier::into_string));

        let mentions_vmware = self
            .error_message
            .as_deref()
            .is_some_and(|msg| msg.contains("VMware"));
        let resource_type = if mentions_vmware {
            "VMware VM".to_string()
        } else {
            non_empty(self.app_type).unwrap_or_default()
        };

        ResolvedJob {
            bytes_transferred: first_non_zero([
                self.data_copied_in_bytes.as_ref().and_then(Numeric::as_bytes),
                self.bytes_written.as_ref().and_then(Numeric::as_bytes),
                self.transfer_size.as_ref().and_then(Numeric::as_bytes),
            ]),
            total_resource_size_bytes: resolve_total_size(
                &self.sizes,
                self.protected_resource_details.as_ref(),
            ),
            duration_seconds: self.timing.duration_seconds(),
            job_id,
            status: None,
            message: None,
            resource_name: non_empty(self.app_name)
                .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string()),
            resource_type,
        }
    }
}

/// Secondary job log entry, keyed by job name
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EnrichmentPayload {
    job_name: Option<Identifier>,
    resource_data_size_in_gib: Option<Numeric>,
    #[serde(rename = "resourceDataSizeInGib")]
    resource_data_size_in_gib_camel: Option<Numeric>,
    snapshot_disk_size_in_gib: Option<Numeric>,
    #[serde(rename = "snapshotDiskSizeInGib")]
    snapshot_disk_size_in_gib_camel: Option<Numeric>,
    data_copied_in_gib: Option<Numeric>,
    onvault_pool_storage_consumed_in_gib: Option<Numeric>,
}

impl EnrichmentPayload {
    /// Returns the job name and the (total size, bytes transferred) pair
    pub fn resolve(self) -> (Option<String>, u64, u64) {
        let total = first_non_zero([
            self.resource_data_size_in_gib
                .as_ref()
                .and_then(Numeric::gib_as_bytes),
            self.resource_data_size_in_gib_camel
                .as_ref()
                .and_then(Numeric::gib_as_bytes),
            self.snapshot_disk_size_in_gib
                .as_ref()
                .and_then(Numeric::gib_as_bytes),
            self.snapshot_disk_size_in_gib_camel
                .as_ref()
                .and_then(Numeric::gib_as_bytes),
        ]);
        let transferred = first_non_zero([
            self.data_copied_in_gib.as_ref().and_then(Numeric::gib_as_bytes),
            self.onvault_pool_storage_consumed_in_gib
                .as_ref()
                .and_then(Numeric::gib_as_bytes),
        ]);
        (self.job_name.and_then(Identifier::into_string), total, transferred)
    }
}
