//! Job reconciliation
//!
//! A job reports several events over its lifetime (and the log stream may
//! repeat them). Events are grouped by job id and each group collapses to a
//! single [`JobRecord`]:
//!
//! - the final status is the highest-ranked status seen anywhere in the group
//! - the record's attributes come from the first event (input order) carrying
//!   that status, so a RUNNING -> FAILED job reports the FAILED event's payload
//!
//! Groups are kept in ordered maps so the output is deterministic for a given
//! input ordering.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::models::{JobEvent, JobRecord, JobStatus};

/// Output of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// One record per distinct non-empty job id, sorted by job id
    pub records: Vec<JobRecord>,
    /// Events dropped for lacking a job id
    pub missing_job_id: usize,
    /// Records whose attributes came from the latest event because no event
    /// carried the final status
    pub fallback_representatives: usize,
}

/// How the representative event of a group was chosen
#[derive(Debug, Clone, Copy, PartialEq)]
enum Representative<'e> {
    Exact(&'e JobEvent),
    Latest(&'e JobEvent),
}

fn final_status(group: &[&JobEvent]) -> JobStatus {
    group
        .iter()
        .map(|event| event.status)
        .max_by_key(|status| status.rank())
        .unwrap_or(JobStatus::Unknown)
}

fn representative<'e>(group: &[&'e JobEvent], status: JobStatus) -> Option<Representative<'e>> {
    if let Some(event) = group.iter().find(|event| event.status == status) {
        return Some(Representative::Exact(*event));
    }
    group
        .iter()
        .max_by_key(|event| event.timestamp)
        .map(|event| Representative::Latest(*event))
}

/// Collapse job events into one record per job id
pub fn reconcile<'a, I>(events: I) -> Reconciliation
where
    I: IntoIterator<Item = &'a JobEvent>,
{
    let mut groups: BTreeMap<&'a str, Vec<&'a JobEvent>> = BTreeMap::new();
    let mut result = Reconciliation::default();

    for event in events {
        match event.job_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(job_id) => groups.entry(job_id).or_default().push(event),
            None => result.missing_job_id += 1,
        }
    }

    for (job_id, group) in groups {
        let status = final_status(&group);
        let event = match representative(&group, status) {
            Some(Representative::Exact(event)) => event,
            Some(Representative::Latest(event)) => {
                result.fallback_representatives += 1;
                warn!(
                    job_id = %job_id,
                    final_status = %status,
                    "No event carries the final status, using the latest event"
                );
                event
            }
            None => continue,
        };
        result
            .records
            .push(JobRecord::from_representative(job_id.to_string(), event, status));
    }

    debug!(
        records = result.records.len(),
        missing_job_id = result.missing_job_id,
        "Reconciled job events"
    );
    result
}
