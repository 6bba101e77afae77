//! Configuration management for the CLI
//!
//! Settings come from an optional config file, then `GCBDR_`-prefixed
//! environment variables (`__` separates nested keys, e.g.
//! `GCBDR_ANALYSIS__THRESHOLDS__Z_SCORE=2.5`), then command-line flags.

use anyhow::{Context, Result};
use monitor_lib::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Days of history fetched before the evaluated day
    #[serde(default = "default_days")]
    pub days: u32,

    /// Directory holding `<kind>.jsonl` log exports
    #[serde(default)]
    pub events_dir: Option<PathBuf>,

    /// JSON inventory used to size resources jobs never reported
    #[serde(default)]
    pub inventory: Option<PathBuf>,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_days() -> u32 {
    7
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            events_dir: None,
            inventory: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("GCBDR")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration values")
    }
}
