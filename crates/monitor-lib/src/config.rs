//! Analysis tuning knobs

use serde::{Deserialize, Serialize};

use crate::models::BYTES_PER_MIB;

/// Thresholds for the anomaly tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    /// z-score above which a size or duration is a spike
    #[serde(default = "default_z_score")]
    pub z_score: f64,

    /// Ratio over the mean that flags a size spike when history has no variance
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,

    /// Ratio under the mean that flags a size drop-off
    #[serde(default = "default_drop_off_ratio")]
    pub drop_off_ratio: f64,

    /// Drop-off is only evaluated when the mean transfer exceeds this
    #[serde(default = "default_drop_off_floor_bytes")]
    pub drop_off_floor_bytes: u64,
}

fn default_z_score() -> f64 {
    3.0
}

fn default_spike_ratio() -> f64 {
    1.5
}

fn default_drop_off_ratio() -> f64 {
    0.1
}

fn default_drop_off_floor_bytes() -> u64 {
    100 * BYTES_PER_MIB
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            z_score: default_z_score(),
            spike_ratio: default_spike_ratio(),
            drop_off_ratio: default_drop_off_ratio(),
            drop_off_floor_bytes: default_drop_off_floor_bytes(),
        }
    }
}

/// Settings for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub thresholds: DetectionThresholds,

    /// Fill zero appliance sizes from the secondary job log
    #[serde(default = "default_enrich_appliance_jobs")]
    pub enrich_appliance_jobs: bool,
}

fn default_enrich_appliance_jobs() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: DetectionThresholds::default(),
            enrich_appliance_jobs: default_enrich_appliance_jobs(),
        }
    }
}
