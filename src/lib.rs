//! nc_zonal: per-zone statistics from directories of NetCDF climate files
//!
//! Converts every time step of every eligible gridded file into a raster,
//! aggregates each raster against a fixed polygon zone layer, tags the
//! per-zone rows with date, variable and level, and unions all files into
//! one summary table that is exported as a spreadsheet.
//!
//! ## Key Features
//!
//! - **Process Pool**: one worker per file, bounded pool size, per-worker timeout
//! - **Failure Isolation**: a bad file or time step never affects its siblings
//! - **Zonal Statistics**: count, area, min, max, range, mean, std and sum per zone
//! - **Stable Schema**: every table carries the same 16 columns
//!
//! ## Module Organization
//!
//! - [`inspector`]: dataset dimensions and the time axis
//! - [`rasterizer`] / [`scratch`]: time-slice rasters with scoped lifetime
//! - [`aggregator`] / [`zonal`]: per-zone statistics
//! - [`tagger`] / [`table`]: tagged rows and CSV-backed result tables
//! - [`worker`]: the per-file pipeline and its state machine
//! - [`orchestrator`]: discovery, planning and the worker pool
//! - [`compiler`] / [`export`] / [`manifest`]: summary, spreadsheet, cleanup
//! - [`engine`]: the geospatial engine interface and the NetCDF engine
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nc_zonal::prelude::*;
//!
//! # async fn demo() -> nc_zonal::Result<()> {
//! let config = ExtractConfig::new("inputs", "outputs", "shapes/sub_basins.geojson");
//! let engine = NetcdfEngine::from_config(&config);
//! let launcher = ProcessLauncher::current_exe(&config, 0)?;
//! let report = run_extraction(&config, &engine, &launcher, &CsvExporter).await?;
//! report.print_summary();
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod errors;
pub mod export;
pub mod inspector;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod parallel;
pub mod rasterizer;
pub mod run;
pub mod scratch;
pub mod table;
pub mod tagger;
pub mod timeslice;
pub mod worker;
pub mod zonal;
pub mod zones;

pub use errors::{ExtractError, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::ExtractConfig;
    pub use crate::engine::{GeoEngine, NetcdfEngine};
    pub use crate::errors::{ExtractError, Result};
    pub use crate::export::{CsvExporter, Exporter};
    pub use crate::orchestrator::{InProcessLauncher, ProcessLauncher, WorkerLauncher};
    pub use crate::parallel::PoolConfig;
    pub use crate::run::{run_extraction, RunReport};
    pub use crate::table::{ResultTable, StatRow};
    pub use crate::worker::{FileOutcome, FileStatus};
    pub use crate::zones::ZoneLayer;
}
