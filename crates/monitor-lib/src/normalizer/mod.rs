//! Event normalization
//!
//! Converts one [`RawEvent`] into a [`JobEvent`] (vault and appliance streams)
//! or an [`EnrichmentEntry`] (secondary stream). The payload schema is chosen
//! by the event's stream tag, never by inspecting the payload.

mod payload;

use serde::Deserialize;

use crate::enricher::{EnrichmentEntry, EnrichmentSizes};
use crate::error::MalformedEvent;
use crate::models::{JobEvent, JobSource, JobStatus};
use crate::source::{EventKind, RawEvent};

use payload::{ApplianceEventPayload, EnrichmentPayload, ResolvedJob, VaultJobPayload};

/// Result of normalizing one raw event
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Job(JobEvent),
    Enrichment(EnrichmentEntry),
}

fn is_empty_payload(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn decode<'a, T: Deserialize<'a>>(event: &'a RawEvent) -> Result<T, MalformedEvent> {
    T::deserialize(&event.payload).map_err(|source| MalformedEvent::Schema {
        kind: event.kind,
        source,
    })
}

fn into_job_event(resolved: ResolvedJob, status: JobStatus, event: &RawEvent, source: JobSource) -> JobEvent {
    JobEvent {
        job_id: resolved.job_id,
        status,
        resource_name: resolved.resource_name,
        resource_type: resolved.resource_type,
        bytes_transferred: resolved.bytes_transferred,
        total_resource_size_bytes: resolved.total_resource_size_bytes,
        duration_seconds: resolved.duration_seconds,
        timestamp: event.timestamp,
        source,
        project_id: event.project_id().map(str::to_string),
    }
}

/// Normalize one raw event
pub fn normalize(event: &RawEvent) -> Result<Normalized, MalformedEvent> {
    if is_empty_payload(&event.payload) {
        return Err(MalformedEvent::EmptyPayload { kind: event.kind });
    }

    match event.kind {
        EventKind::Vault => {
            let resolved = decode::<VaultJobPayload>(event)?.resolve();
            let status = match (&resolved.status, &resolved.message) {
                (Some(status), _) => JobStatus::parse(status),
                (None, Some(message)) => JobStatus::infer_from_message(message),
                (None, None) => JobStatus::Unknown,
            };
            Ok(Normalized::Job(into_job_event(
                resolved,
                status,
                event,
                JobSource::Vault,
            )))
        }
        EventKind::Appliance => {
            // Only success events are exported for appliances
            let resolved = decode::<ApplianceEventPayload>(event)?.resolve();
            Ok(Normalized::Job(into_job_event(
                resolved,
                JobStatus::Successful,
                event,
                JobSource::Appliance,
            )))
        }
        EventKind::Enrichment => {
            let (job_name, total, transferred) = decode::<EnrichmentPayload>(event)?.resolve();
            let job_name = job_name.ok_or(MalformedEvent::MissingEnrichmentKey)?;
            Ok(Normalized::Enrichment(EnrichmentEntry {
                job_name,
                sizes: EnrichmentSizes {
                    total_resource_size_bytes: total,
                    bytes_transferred: transferred,
                },
            }))
        }
    }
}
