//! Anomaly detection over backup job baselines

mod detector;

pub use detector::{AnomalyDetector, AnomalyReason};
