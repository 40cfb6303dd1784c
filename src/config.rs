//! Run configuration
//!
//! `ExtractConfig` is built once (TOML file, then CLI overrides) and never
//! mutated afterwards. In-process workers receive a clone; worker processes
//! receive it serialized as JSON on their command line.

use crate::errors::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Immutable configuration shared by the orchestrator and every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractConfig {
    /// Directory holding the gridded input files.
    pub input_dir: PathBuf,
    /// Directory receiving per-file tables and the final export.
    pub output_dir: PathBuf,
    /// GeoJSON polygon layer with one feature per zone.
    pub zones: PathBuf,
    #[serde(default = "default_zone_field")]
    pub zone_field: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    #[serde(default = "default_time_dimension")]
    pub time_dimension: String,
    /// Auxiliary dimension held at a fixed value for every slice.
    #[serde(default = "default_level_dimension")]
    pub level_dimension: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default = "default_x_dimension")]
    pub x_dimension: String,
    #[serde(default = "default_y_dimension")]
    pub y_dimension: String,
    #[serde(default = "default_primary_time_format")]
    pub primary_time_format: String,
    #[serde(default = "default_fallback_time_format")]
    pub fallback_time_format: String,
    /// Worker pool size; `None` uses every CPU core.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    #[serde(default = "default_summary_name")]
    pub summary_name: String,
    /// Keep per-file and summary tables after export.
    #[serde(default)]
    pub keep_tables: bool,
    /// Skip a failing time slice instead of failing the whole file.
    #[serde(default = "default_true")]
    pub isolate_slice_failures: bool,
}

fn default_zone_field() -> String {
    "NAME".to_string()
}
fn default_file_prefix() -> String {
    "Extraction_".to_string()
}
fn default_file_suffix() -> String {
    ".nc".to_string()
}
fn default_time_dimension() -> String {
    "time".to_string()
}
fn default_level_dimension() -> String {
    "projection".to_string()
}
fn default_x_dimension() -> String {
    "longitude".to_string()
}
fn default_y_dimension() -> String {
    "latitude".to_string()
}
fn default_primary_time_format() -> String {
    "%m/%d/%Y %H:%M:%S %p".to_string()
}
fn default_fallback_time_format() -> String {
    "%m/%d/%Y".to_string()
}
fn default_worker_timeout_secs() -> u64 {
    6 * 60 * 60
}
fn default_summary_name() -> String {
    "Summary_Extraction".to_string()
}
fn default_true() -> bool {
    true
}

impl ExtractConfig {
    /// Configuration with default settings for the three required paths.
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        zones: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            zones: zones.into(),
            zone_field: default_zone_field(),
            file_prefix: default_file_prefix(),
            file_suffix: default_file_suffix(),
            time_dimension: default_time_dimension(),
            level_dimension: default_level_dimension(),
            level: 0,
            x_dimension: default_x_dimension(),
            y_dimension: default_y_dimension(),
            primary_time_format: default_primary_time_format(),
            fallback_time_format: default_fallback_time_format(),
            workers: None,
            worker_timeout_secs: default_worker_timeout_secs(),
            summary_name: default_summary_name(),
            keep_tables: false,
            isolate_slice_failures: true,
        }
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ExtractError::Config(e.to_string()))
    }

    /// Check settings that would otherwise fail deep inside a worker.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("zone_field", &self.zone_field),
            ("file_prefix", &self.file_prefix),
            ("time_dimension", &self.time_dimension),
            ("x_dimension", &self.x_dimension),
            ("y_dimension", &self.y_dimension),
            ("summary_name", &self.summary_name),
        ];
        for (key, value) in named {
            if value.trim().is_empty() {
                return Err(ExtractError::Config(format!("'{key}' must not be empty")));
            }
        }
        if self.workers == Some(0) {
            return Err(ExtractError::Config("'workers' must be at least 1".to_string()));
        }
        if self.worker_timeout_secs == 0 {
            return Err(ExtractError::Config(
                "'worker_timeout_secs' must be at least 1".to_string(),
            ));
        }
        if self.x_dimension == self.y_dimension {
            return Err(ExtractError::Config(
                "x and y dimensions must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize for a worker process command line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
