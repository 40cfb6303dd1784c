//! Per-file extraction worker
//!
//! A worker owns one input file from open to close:
//!
//! `Opened → Inspecting → {Rasterizing → Aggregating → Tagging → Merging}* → Closed`
//!
//! Any failure moves the file to `Failed`, deletes its partial table and is
//! reported as a [`FileOutcome`] instead of being propagated. Time steps are
//! visited in the dataset's native order.

use crate::aggregator::aggregate;
use crate::config::ExtractConfig;
use crate::engine::{CapabilityLease, GeoEngine, NetcdfEngine};
use crate::errors::{ExtractError, Result};
use crate::inspector::Dataset;
use crate::rasterizer::SliceRasterizer;
use crate::scratch::ScratchWorkspace;
use crate::table::ResultTable;
use crate::tagger::{tag, RowTag};
use crate::timeslice::TimeSlice;
use crate::zones::ZoneLayer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Opened,
    Inspecting,
    Rasterizing,
    Aggregating,
    Tagging,
    Merging,
    Closed,
    Failed,
    /// Set by the orchestrator when the worker ran out of time.
    TimedOut,
    /// Set by the orchestrator when the worker process died or misreported.
    Crashed,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opened => "opened",
            Self::Inspecting => "inspecting",
            Self::Rasterizing => "rasterizing",
            Self::Aggregating => "aggregating",
            Self::Tagging => "tagging",
            Self::Merging => "merging",
            Self::Closed => "closed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Crashed => "crashed",
        };
        f.write_str(name)
    }
}

/// One file handed to one worker, with its table path fixed up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub file_name: String,
    pub input: PathBuf,
    pub table: PathBuf,
}

/// Terminal status of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded {
        rows: usize,
        slices: usize,
        skipped_slices: usize,
    },
    Failed {
        stage: FileState,
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

/// What a worker reports back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub table: Option<PathBuf>,
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn skipped(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            table: None,
            status: FileStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(item: &WorkItem, stage: FileState, reason: impl Into<String>) -> Self {
        Self {
            file: item.file_name.clone(),
            table: None,
            status: FileStatus::Failed {
                stage,
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, FileStatus::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }

    pub fn rows(&self) -> usize {
        match self.status {
            FileStatus::Succeeded { rows, .. } => rows,
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    rows: usize,
    slices: usize,
    skipped_slices: usize,
}

/// Run the whole per-file pipeline and report its outcome.
pub fn process_file<E: GeoEngine>(
    engine: &E,
    config: &ExtractConfig,
    zones: &ZoneLayer,
    item: &WorkItem,
) -> FileOutcome {
    process_file_with_cancel(engine, config, zones, item, &AtomicBool::new(false))
}

/// Like [`process_file`], but stops before the next time slice once `cancel`
/// is set and never leaves a table behind after that.
///
/// Only `ResultTable::create` creates the table file, and it runs before the
/// first check, so a table removed by the orchestrator is never recreated.
pub fn process_file_with_cancel<E: GeoEngine>(
    engine: &E,
    config: &ExtractConfig,
    zones: &ZoneLayer,
    item: &WorkItem,
    cancel: &AtomicBool,
) -> FileOutcome {
    tracing::info!(file = %item.file_name, "processing file");

    let lease = match CapabilityLease::acquire(engine) {
        Ok(lease) => lease,
        Err(e) => {
            tracing::error!(file = %item.file_name, error = %e, "capability unavailable in worker");
            return FileOutcome::failed(item, FileState::Opened, e.to_string());
        }
    };

    let mut state = FileState::Opened;
    let result = run_pipeline(engine, config, zones, item, &mut state, cancel).and_then(|progress| {
        if cancel.load(Ordering::SeqCst) {
            return Err(cancelled(item));
        }
        Ok(progress)
    });
    drop(lease);

    match result {
        Ok(progress) => {
            tracing::info!(
                file = %item.file_name,
                rows = progress.rows,
                slices = progress.slices,
                skipped_slices = progress.skipped_slices,
                "file closed"
            );
            FileOutcome {
                file: item.file_name.clone(),
                table: Some(item.table.clone()),
                status: FileStatus::Succeeded {
                    rows: progress.rows,
                    slices: progress.slices,
                    skipped_slices: progress.skipped_slices,
                },
            }
        }
        Err(e) => {
            tracing::error!(file = %item.file_name, stage = %state, error = %e, "file failed");
            discard_partial_table(item);
            let stage = match e {
                ExtractError::Cancelled { .. } => FileState::from(&e),
                _ => state,
            };
            FileOutcome::failed(item, stage, e.to_string())
        }
    }
}

/// Worker entry used by worker processes: builds the NetCDF engine and
/// loads the zone layer itself.
pub fn process_file_with_netcdf(config: &ExtractConfig, item: &WorkItem) -> FileOutcome {
    let zones = match ZoneLayer::from_geojson_path(&config.zones, &config.zone_field) {
        Ok(zones) => zones,
        Err(e) => return FileOutcome::failed(item, FileState::Opened, e.to_string()),
    };
    let engine = NetcdfEngine::from_config(config);
    process_file(&engine, config, &zones, item)
}

fn run_pipeline<E: GeoEngine>(
    engine: &E,
    config: &ExtractConfig,
    zones: &ZoneLayer,
    item: &WorkItem,
    state: &mut FileState,
    cancel: &AtomicBool,
) -> Result<Progress> {
    *state = FileState::Inspecting;
    let dataset = Dataset::open(engine, &item.input, config)?;
    let time_len = dataset.time_len()?;
    let variable = dataset.variable().to_string();
    let level = dataset.level().value;
    tracing::debug!(
        file = %item.file_name,
        variable = %variable,
        time_steps = time_len,
        level_present = dataset.level().is_present(),
        "dataset inspected"
    );

    let table = ResultTable::create(&item.table)?;
    let rasterizer = SliceRasterizer::from_config(config);
    let scratch = ScratchWorkspace::new();
    let mut progress = Progress::default();

    for index in 0..time_len {
        if cancel.load(Ordering::SeqCst) {
            return Err(cancelled(item));
        }
        *state = FileState::Inspecting;
        let slice = TimeSlice::new(
            index,
            dataset.time_value(index)?,
            &config.primary_time_format,
            &config.fallback_time_format,
        )?;

        match extract_slice(
            &dataset, &rasterizer, &scratch, zones, config, &table, &variable, level, &slice, state,
        ) {
            Ok(rows) => {
                progress.rows += rows;
                progress.slices += 1;
            }
            Err(e) if e.is_slice_local() && config.isolate_slice_failures => {
                tracing::warn!(
                    file = %item.file_name,
                    time_index = index,
                    stage = %state,
                    error = %e,
                    "skipping time slice"
                );
                progress.skipped_slices += 1;
            }
            Err(e) => return Err(e),
        }
    }

    debug_assert!(scratch.live().is_empty());
    tracing::debug!(file = %item.file_name, peak_rasters = scratch.peak(), "scratch released");
    *state = FileState::Closed;
    Ok(progress)
}

#[allow(clippy::too_many_arguments)]
fn extract_slice<E: GeoEngine>(
    dataset: &Dataset<'_, E>,
    rasterizer: &SliceRasterizer,
    scratch: &ScratchWorkspace,
    zones: &ZoneLayer,
    config: &ExtractConfig,
    table: &ResultTable,
    variable: &str,
    level: i64,
    slice: &TimeSlice,
    state: &mut FileState,
) -> Result<usize> {
    *state = FileState::Rasterizing;
    let raster = rasterizer.rasterize(dataset, scratch, variable, slice.index, level)?;

    *state = FileState::Aggregating;
    let stats = aggregate(dataset.engine(), &raster, zones, &config.zone_field)?;
    drop(raster);

    *state = FileState::Tagging;
    let rows = tag(&stats, &RowTag::new(slice.date, variable, level));

    *state = FileState::Merging;
    table.append(&rows)
}

fn cancelled(item: &WorkItem) -> ExtractError {
    ExtractError::Cancelled {
        file: item.file_name.clone(),
    }
}

/// Remove the per-file table of `item` if it exists.
pub(crate) fn discard_partial_table(item: &WorkItem) {
    if item.table.exists() {
        if let Err(e) = std::fs::remove_file(&item.table) {
            tracing::warn!(table = %item.table.display(), error = %e, "could not remove partial table");
        }
    }
}

impl From<&ExtractError> for FileState {
    fn from(error: &ExtractError) -> Self {
        match error {
            ExtractError::WorkerTimeout { .. } | ExtractError::Cancelled { .. } => Self::TimedOut,
            ExtractError::Worker { .. } => Self::Crashed,
            _ => Self::Failed,
        }
    }
}
