//! Raw event retrieval
//!
//! The engine never performs I/O itself. Events are fetched up front through
//! an [`EventSource`], one request per event kind, with the kinds fetched
//! concurrently. Any fetch failure aborts the run: a partial batch cannot be
//! trusted to represent a complete window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::SourceError;

/// Which log stream an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Multi-event backup/restore job lifecycle logs
    Vault,
    /// Point-in-time appliance success events
    Appliance,
    /// Secondary job logs used only to fill in missing sizes
    Enrichment,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Vault => "vault",
            EventKind::Appliance => "appliance",
            EventKind::Enrichment => "enrichment",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw log entry: an opaque payload plus its timestamp and stream tag.
///
/// `log_name` and `resource_labels` describe where the entry was logged and
/// are only used to work out which project a job belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_labels: BTreeMap<String, String>,
}

impl RawEvent {
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp,
            payload,
            log_name: None,
            resource_labels: BTreeMap::new(),
        }
    }

    pub fn with_log_name(mut self, log_name: impl Into<String>) -> Self {
        self.log_name = Some(log_name.into());
        self
    }

    pub fn with_resource_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource_labels.insert(key.into(), value.into());
        self
    }

    /// Project the entry was logged in: the `project_id` resource label,
    /// else the `projects/{project}/logs/...` log name.
    pub fn project_id(&self) -> Option<&str> {
        let from_labels = self
            .resource_labels
            .get("project_id")
            .map(|p| p.trim())
            .filter(|p| !p.is_empty());

        from_labels.or_else(|| {
            let mut parts = self.log_name.as_deref()?.split('/');
            match (parts.next(), parts.next()) {
                (Some("projects"), Some(project)) if !project.is_empty() => Some(project),
                _ => None,
            }
        })
    }
}

/// Inclusive time range for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// The `days` days leading up to `end`. Fails when the start would fall
    /// outside the representable calendar.
    pub fn trailing_days(end: DateTime<Utc>, days: u32) -> Result<Self, SourceError> {
        let start = end
            .checked_sub_signed(chrono::Duration::days(i64::from(days)))
            .ok_or(SourceError::RangeOutOfBounds { end, days })?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Which job families to fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSelection {
    #[default]
    All,
    Vault,
    Appliance,
}

impl SourceSelection {
    pub fn includes_vault(&self) -> bool {
        matches!(self, SourceSelection::All | SourceSelection::Vault)
    }

    /// Enrichment events are only useful when appliance jobs are fetched
    pub fn includes_appliance(&self) -> bool {
        matches!(self, SourceSelection::All | SourceSelection::Appliance)
    }
}

impl FromStr for SourceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(SourceSelection::All),
            "vault" => Ok(SourceSelection::Vault),
            "appliance" => Ok(SourceSelection::Appliance),
            other => Err(format!(
                "unknown source type '{other}' (expected all, vault or appliance)"
            )),
        }
    }
}

/// Trait for raw event retrieval implementations
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch every event of one kind whose timestamp falls in `range`
    async fn fetch(&self, kind: EventKind, range: &TimeRange) -> Result<Vec<RawEvent>, SourceError>;
}

async fn fetch_kind(
    source: &dyn EventSource,
    kind: EventKind,
    range: &TimeRange,
    wanted: bool,
) -> Result<Vec<RawEvent>, SourceError> {
    if !wanted {
        return Ok(Vec::new());
    }
    let events = source.fetch(kind, range).await?;
    debug!(kind = %kind, count = events.len(), "Fetched events");
    Ok(events)
}

/// Fetch all selected event kinds concurrently and concatenate them
/// in vault, appliance, enrichment order.
pub async fn fetch_events(
    source: &dyn EventSource,
    range: &TimeRange,
    selection: SourceSelection,
) -> Result<Vec<RawEvent>, SourceError> {
    let (vault, appliance, enrichment) = tokio::try_join!(
        fetch_kind(source, EventKind::Vault, range, selection.includes_vault()),
        fetch_kind(source, EventKind::Appliance, range, selection.includes_appliance()),
        fetch_kind(source, EventKind::Enrichment, range, selection.includes_appliance()),
    )?;

    info!(
        vault = vault.len(),
        appliance = appliance.len(),
        enrichment = enrichment.len(),
        "Event retrieval complete"
    );

    let mut events = vault;
    events.extend(appliance);
    events.extend(enrichment);
    Ok(events)
}

/// Monitored resource attached to an exported entry
#[derive(Debug, Default, Deserialize)]
struct EnvelopeResource {
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// Line format of the exported log files
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    timestamp: DateTime<Utc>,
    #[serde(default, alias = "jsonPayload")]
    payload: serde_json::Value,
    #[serde(default, alias = "logName")]
    log_name: Option<String>,
    #[serde(default)]
    resource: EnvelopeResource,
}

impl EventEnvelope {
    fn into_raw(self, kind: EventKind) -> RawEvent {
        RawEvent {
            kind,
            timestamp: self.timestamp,
            payload: self.payload,
            log_name: self.log_name,
            resource_labels: self.resource.labels,
        }
    }
}

/// Reads exported log entries from `<dir>/<kind>.jsonl`, one JSON object per line.
///
/// A missing file is an empty stream; an unreadable file or a line without a
/// valid envelope fails the fetch.
#[derive(Debug, Clone)]
pub struct FileEventSource {
    dir: PathBuf,
}

impl FileEventSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: EventKind) -> PathBuf {
        self.dir.join(format!("{}.jsonl", kind))
    }

    fn parse_lines(
        path: &Path,
        kind: EventKind,
        content: &str,
        range: &TimeRange,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let mut events = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let envelope: EventEnvelope =
                serde_json::from_str(line).map_err(|source| SourceError::Decode {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })?;
            if range.contains(envelope.timestamp) {
                events.push(envelope.into_raw(kind));
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl EventSource for FileEventSource {
    async fn fetch(&self, kind: EventKind, range: &TimeRange) -> Result<Vec<RawEvent>, SourceError> {
        let path = self.path_for(kind);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No export file, treating stream as empty");
                return Ok(Vec::new());
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };
        Self::parse_lines(&path, kind, &content, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn range() -> TimeRange {
        TimeRange {
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!("ALL".parse::<SourceSelection>(), Ok(SourceSelection::All));
        assert_eq!(
            "appliance".parse::<SourceSelection>(),
            Ok(SourceSelection::Appliance)
        );
        assert!("gcb".parse::<SourceSelection>().is_err());
        assert!(!SourceSelection::Vault.includes_appliance());
    }

    #[test]
    fn test_trailing_days() {
        let end = Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap();
        let range = TimeRange::trailing_days(end, 7).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert!(range.contains(end));
    }

    #[test]
    fn test_trailing_days_out_of_calendar() {
        let err = TimeRange::trailing_days(Utc::now(), u32::MAX).unwrap_err();
        assert!(matches!(err, SourceError::RangeOutOfBounds { days: u32::MAX, .. }));
    }

    #[test]
    fn test_project_id_from_labels_then_log_name() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let event = RawEvent::new(EventKind::Vault, ts, serde_json::json!({"jobId": "a"}))
            .with_log_name("projects/backup-host/logs/backupdr.googleapis.com%2Fgcb_backup_recovery_jobs");
        assert_eq!(event.project_id(), Some("backup-host"));

        let labelled = event.clone().with_resource_label("project_id", "workload-1");
        assert_eq!(labelled.project_id(), Some("workload-1"));

        let bare = RawEvent::new(EventKind::Vault, ts, serde_json::json!({"jobId": "a"}))
            .with_log_name("organizations/1/logs/x");
        assert_eq!(bare.project_id(), None);
    }

    #[test]
    fn test_parse_lines_filters_range() {
        let content = r#"
{"timestamp": "2024-03-02T10:00:00Z", "payload": {"jobId": "a"}}

{"timestamp": "2024-02-01T10:00:00Z", "payload": {"jobId": "old"}}
{"timestamp": "2024-03-03T10:00:00Z", "jsonPayload": {"jobId": "b"}, "logName": "projects/p1/logs/x", "resource": {"labels": {"project_id": "p2"}}}
"#;
        let events =
            FileEventSource::parse_lines(Path::new("vault.jsonl"), EventKind::Vault, content, &range())
                .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload["jobId"], "b");
        assert_eq!(events[1].log_name.as_deref(), Some("projects/p1/logs/x"));
        assert_eq!(events[1].project_id(), Some("p2"));
        assert_eq!(events[0].project_id(), None);
        assert!(events.iter().all(|e| e.kind == EventKind::Vault));
    }

    #[test]
    fn test_parse_lines_reports_bad_line() {
        let content = "{\"timestamp\": \"2024-03-02T10:00:00Z\"}\nnot json\n";
        let err =
            FileEventSource::parse_lines(Path::new("vault.jsonl"), EventKind::Vault, content, &range())
                .unwrap_err();
        assert!(matches!(err, SourceError::Decode { line: 2, .. }));
    }

    struct FailingSource;

    #[async_trait]
    impl EventSource for FailingSource {
        async fn fetch(&self, kind: EventKind, _range: &TimeRange) -> Result<Vec<RawEvent>, SourceError> {
            match kind {
                EventKind::Appliance => Err(SourceError::Upstream {
                    kind,
                    message: "quota exceeded".to_string(),
                }),
                _ => Ok(Vec::new()),
            }
        }
    }

    #[test]
    fn test_fetch_failure_is_fatal() {
        let result = tokio_test::block_on(fetch_events(&FailingSource, &range(), SourceSelection::All));
        assert!(matches!(result, Err(SourceError::Upstream { .. })));
    }

    #[test]
    fn test_fetch_skips_unselected_kinds() {
        let result =
            tokio_test::block_on(fetch_events(&FailingSource, &range(), SourceSelection::Vault));
        assert!(result.unwrap().is_empty());
    }
}
