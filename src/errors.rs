//! Centralized error handling for nc_zonal
//!
//! One error type covers the whole extraction run. Variants are grouped by
//! how far a failure is allowed to travel: capability errors stop the run,
//! format and worker errors stay inside one file, rasterization and
//! aggregation errors stay inside one time slice.

use std::path::PathBuf;

/// Main error type for extraction operations
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Required engine capability (statistics module) is missing
    #[error("capability '{capability}' is unavailable")]
    CapabilityUnavailable { capability: String },

    /// Input file is not a usable gridded dataset
    #[error("invalid dataset {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// A time slice could not be turned into a raster
    #[error("rasterization of '{variable}' failed: {reason}")]
    Rasterization { variable: String, reason: String },

    /// Zonal statistics failed for one raster
    #[error("zonal aggregation failed: {reason}")]
    Aggregation { reason: String },

    /// Column set of a table does not match the result schema
    #[error("schema mismatch in table {}: expected [{expected}], found [{found}]", table.display())]
    Schema {
        table: PathBuf,
        expected: String,
        found: String,
    },

    /// A time coordinate matched neither the primary nor the fallback format
    #[error("time value '{value}' does not match any configured date format")]
    DateParse { value: String },

    /// Zone polygon layer could not be loaded
    #[error("zone layer {}: {reason}", path.display())]
    ZoneLayer { path: PathBuf, reason: String },

    /// Invalid run configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Worker exceeded its time budget
    #[error("worker for '{file}' timed out after {secs}s")]
    WorkerTimeout { file: String, secs: u64 },

    /// Worker was told to stop after its orchestrator gave up on it
    #[error("extraction of '{file}' was cancelled")]
    Cancelled { file: String },

    /// Worker process crashed or returned an unreadable report
    #[error("worker for '{file}' failed: {reason}")]
    Worker { file: String, reason: String },

    /// NetCDF library errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table storage errors
    #[error("table error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding errors (zone layers, worker reports)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Array shape or dimension error
    #[error("array error: {0}")]
    Array(#[from] ndarray::ShapeError),
}

impl ExtractError {
    /// Process exit code for a run that stops on this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CapabilityUnavailable { .. } => 1,
            _ => 2,
        }
    }

    /// True for errors that must abort the run instead of one file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable { .. })
    }

    /// True for errors confined to a single time slice.
    #[must_use]
    pub fn is_slice_local(&self) -> bool {
        matches!(self, Self::Rasterization { .. } | Self::Aggregation { .. })
    }
}

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;
