//! Backup job monitoring library
//!
//! This crate provides the core functionality for:
//! - Normalizing vault and appliance job log events
//! - Reconciling job lifecycles and enriching missing sizes
//! - Per-resource baselines and anomaly detection
//! - Resource reports, filtering and daily volume baselines
//! - Event retrieval seams and observability

pub mod anomaly;
pub mod baseline;
pub mod config;
pub mod enricher;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod observability;
pub mod pipeline;
pub mod reconciler;
pub mod report;
pub mod source;

pub use config::{AnalysisConfig, DetectionThresholds};
pub use error::{LookupError, MalformedEvent, SourceError};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use pipeline::{AnalysisReport, Analyzer, Diagnostics, Summary};
pub use source::{fetch_events, EventKind, EventSource, FileEventSource, RawEvent, SourceSelection, TimeRange};
