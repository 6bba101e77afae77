//! Baseline deviation detection
//!
//! Each current-window job is compared with its resource's history
//! statistics using three independent tests. All tests run for every job and
//! their reasons accumulate:
//!
//! - size spike: z-score over the threshold, or a plain ratio over the mean
//!   when history has no variance to compute a z-score from
//! - size drop-off: transfer collapsed below a fraction of a non-trivial mean
//! - duration spike: z-score over the threshold (no ratio fallback)
//!
//! Resources without history are never flagged.

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::baseline::{History, ResourceStats, WindowStats};
use crate::config::DetectionThresholds;
use crate::models::{Anomaly, JobRecord};

/// Why a job was flagged
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyReason {
    /// Transfer size z-score over the threshold
    SizeSpike { z_score: f64 },
    /// Transfer size over the ratio threshold; history had no variance
    SizeSpikeRatio { ratio: f64 },
    /// Transfer size under the drop-off fraction of the mean
    SizeDropOff { ratio: f64 },
    /// Duration z-score over the threshold
    DurationSpike { z_score: f64 },
}

impl fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyReason::SizeSpike { z_score } => write!(f, "Size Spike (Z={:.1})", z_score),
            AnomalyReason::SizeSpikeRatio { ratio } => {
                write!(f, "Size Spike ({:.1}x avg)", ratio)
            }
            AnomalyReason::SizeDropOff { ratio } => {
                write!(f, "Size Drop-off ({:.2}x avg)", ratio)
            }
            AnomalyReason::DurationSpike { z_score } => {
                write!(f, "Duration Spike (Z={:.1})", z_score)
            }
        }
    }
}

impl Serialize for AnomalyReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Flags jobs that deviate from their resource's history
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    pub thresholds: DetectionThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: DetectionThresholds) -> Self {
        Self { thresholds }
    }

    /// Run every test for one job against its resource's history
    pub fn evaluate(&self, job: &JobRecord, history: &ResourceStats) -> Vec<AnomalyReason> {
        let t = &self.thresholds;
        let bytes = job.bytes_transferred as f64;
        let mean = history.avg_bytes_transferred;
        let mut reasons = Vec::new();

        if history.stdev_bytes_transferred > 0.0 {
            let z_score = (bytes - mean) / history.stdev_bytes_transferred;
            if z_score > t.z_score {
                reasons.push(AnomalyReason::SizeSpike { z_score });
            }
        } else if mean > 0.0 && bytes > t.spike_ratio * mean {
            reasons.push(AnomalyReason::SizeSpikeRatio { ratio: bytes / mean });
        }

        if mean > t.drop_off_floor_bytes as f64 && bytes < t.drop_off_ratio * mean {
            reasons.push(AnomalyReason::SizeDropOff { ratio: bytes / mean });
        }

        if history.stdev_duration_seconds > 0.0 {
            let z_score = (f64::from(job.duration_seconds) - history.avg_duration_seconds)
                / history.stdev_duration_seconds;
            if z_score > t.z_score {
                reasons.push(AnomalyReason::DurationSpike { z_score });
            }
        }

        reasons
    }

    /// Evaluate current-window jobs against history statistics
    pub fn detect<'a, I>(&self, jobs: I, history: &WindowStats<History>) -> Vec<Anomaly>
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        let mut anomalies = Vec::new();

        for job in jobs {
            let Some(stats) = history.get(&job.resource_name) else {
                continue;
            };

            let reasons = self.evaluate(job, stats);
            if reasons.is_empty() {
                continue;
            }

            debug!(
                job_id = %job.job_id,
                resource = %job.resource_name,
                reasons = reasons.len(),
                "Job deviates from baseline"
            );
            anomalies.push(Anomaly {
                job_id: job.job_id.clone(),
                resource_name: job.resource_name.clone(),
                resource_type: job.resource_type.clone(),
                bytes_transferred: job.bytes_transferred,
                avg_bytes_transferred: stats.avg_bytes_transferred,
                duration_seconds: job.duration_seconds,
                avg_duration_seconds: stats.avg_duration_seconds,
                total_resource_size_bytes: job.total_resource_size_bytes,
                timestamp: job.timestamp,
                reasons,
            });
        }

        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobSource, JobStatus, BYTES_PER_GIB, BYTES_PER_MIB};
    use chrono::{TimeZone, Utc};

    fn stats(avg_bytes: f64, stdev_bytes: f64, avg_duration: f64, stdev_duration: f64) -> ResourceStats {
        ResourceStats {
            resource_name: "db".to_string(),
            resource_type: "Cloud SQL".to_string(),
            data_point_count: 5,
            avg_bytes_transferred: avg_bytes,
            stdev_bytes_transferred: stdev_bytes,
            avg_duration_seconds: avg_duration,
            stdev_duration_seconds: stdev_duration,
            avg_total_resource_size_bytes: 0.0,
            project_id: None,
        }
    }

    fn job(bytes: u64, duration: u32) -> JobRecord {
        JobRecord {
            job_id: "j".to_string(),
            status: JobStatus::Successful,
            final_status: JobStatus::Successful,
            resource_name: "db".to_string(),
            resource_type: "Cloud SQL".to_string(),
            bytes_transferred: bytes,
            total_resource_size_bytes: 0,
            duration_seconds: duration,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 8, 1, 0, 0).unwrap(),
            source: JobSource::Vault,
            project_id: None,
        }
    }

    #[test]
    fn test_ratio_fallback_without_variance() {
        let detector = AnomalyDetector::default();
        let history = stats(100.0, 0.0, 0.0, 0.0);

        let reasons = detector.evaluate(&job(200, 0), &history);
        assert_eq!(reasons, vec![AnomalyReason::SizeSpikeRatio { ratio: 2.0 }]);
        assert!(reasons[0].to_string().starts_with("Size Spike"));

        assert!(detector.evaluate(&job(110, 0), &history).is_empty());
    }

    #[test]
    fn test_z_score_spike() {
        let detector = AnomalyDetector::default();
        let sigma = 0.1 * BYTES_PER_GIB as f64;
        let history = stats(BYTES_PER_GIB as f64, sigma, 0.0, 0.0);

        let high = (BYTES_PER_GIB as f64 + 4.0 * sigma) as u64;
        let reasons = detector.evaluate(&job(high, 0), &history);
        assert_eq!(reasons.len(), 1);
        assert!(matches!(reasons[0], AnomalyReason::SizeSpike { z_score } if z_score > 3.9));
        assert_eq!(reasons[0].to_string(), "Size Spike (Z=4.0)");

        let moderate = (BYTES_PER_GIB as f64 + 2.0 * sigma) as u64;
        assert!(detector.evaluate(&job(moderate, 0), &history).is_empty());
    }

    #[test]
    fn test_drop_off_needs_floor() {
        let detector = AnomalyDetector::default();

        let small = stats(100.0 * BYTES_PER_MIB as f64, 0.0, 0.0, 0.0);
        assert!(detector.evaluate(&job(0, 0), &small).is_empty());

        let large = stats(BYTES_PER_GIB as f64, 0.0, 0.0, 0.0);
        let reasons = detector.evaluate(&job(BYTES_PER_MIB, 0), &large);
        assert_eq!(reasons.len(), 1);
        assert!(matches!(reasons[0], AnomalyReason::SizeDropOff { .. }));
    }

    #[test]
    fn test_duration_spike_has_no_ratio_fallback() {
        let detector = AnomalyDetector::default();
        assert!(detector
            .evaluate(&job(0, 10_000), &stats(0.0, 0.0, 60.0, 0.0))
            .is_empty());

        let reasons = detector.evaluate(&job(0, 200), &stats(0.0, 0.0, 60.0, 20.0));
        assert_eq!(reasons, vec![AnomalyReason::DurationSpike { z_score: 7.0 }]);
    }

    #[test]
    fn test_reasons_accumulate_in_order() {
        let detector = AnomalyDetector::default();
        let history = stats(10.0, 1.0, 60.0, 5.0);
        let reasons = detector.evaluate(&job(100, 600), &history);
        assert_eq!(reasons.len(), 2);
        assert!(matches!(reasons[0], AnomalyReason::SizeSpike { .. }));
        assert!(matches!(reasons[1], AnomalyReason::DurationSpike { .. }));
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = AnomalyDetector::new(DetectionThresholds {
            spike_ratio: 1.05,
            ..DetectionThresholds::default()
        });
        let reasons = detector.evaluate(&job(110, 0), &stats(100.0, 0.0, 0.0, 0.0));
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn test_reason_serializes_as_text() {
        let json = serde_json::to_string(&AnomalyReason::SizeDropOff { ratio: 0.05 }).unwrap();
        assert_eq!(json, "\"Size Drop-off (0.05x avg)\"");
    }
}
