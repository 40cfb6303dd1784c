//! Geospatial engine collaborator
//!
//! The extraction pipeline never reads grids or computes statistics itself;
//! it drives a [`GeoEngine`]. The engine is created once per worker and is
//! not shared between workers, so implementations need not be `Sync`.
//!
//! [`NetcdfEngine`] is the built-in engine backed by the `netcdf` crate.

pub mod netcdf_engine;

pub use netcdf_engine::NetcdfEngine;

use crate::errors::{ExtractError, Result};
use crate::zones::ZoneLayer;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Outcome of probing the engine for its statistics capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub available: bool,
}

/// A coordinate value along one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    Number(f64),
    Text(String),
}

impl DimensionValue {
    /// Value equality used for by-value selection.
    ///
    /// Numbers compare with a relative tolerance so that values read back as
    /// `f32` still match an `f64` request.
    pub fn matches(&self, other: &DimensionValue) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                let scale = a.abs().max(b.abs()).max(1.0);
                (a - b).abs() <= 1e-6 * scale
            }
            (Self::Text(a), Self::Text(b)) => a.trim() == b.trim(),
            (Self::Number(a), Self::Text(b)) | (Self::Text(b), Self::Number(a)) => {
                b.trim().parse::<f64>().map_or(false, |b| (a - b).abs() <= 1e-6)
            }
        }
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Pins one dimension to a coordinate value.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionConstraint {
    pub dimension: String,
    pub value: DimensionValue,
}

/// How constraint values are resolved to indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSelection {
    /// Match the coordinate value, whatever its index.
    ByValue,
}

/// Where a cell is sampled when deciding zone membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSampling {
    Center,
}

/// Everything needed to materialize one 2-D slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    pub variable: String,
    pub x_dimension: String,
    pub y_dimension: String,
    pub constraints: Vec<DimensionConstraint>,
    pub selection: ValueSelection,
    pub sampling: CellSampling,
}

/// A 2-D grid for one time slice. Rows follow `y`, columns follow `x`;
/// NaN marks no-data cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub name: String,
    pub values: Array2<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub cell_width: f64,
    pub cell_height: f64,
}

impl Raster {
    /// Build a raster and derive cell size from coordinate spacing.
    pub fn new(name: impl Into<String>, values: Array2<f64>, x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        let (rows, cols) = values.dim();
        if rows != y.len() || cols != x.len() {
            return Err(ExtractError::Rasterization {
                variable: String::new(),
                reason: format!(
                    "grid is {rows}x{cols} but coordinates are {}x{}",
                    y.len(),
                    x.len()
                ),
            });
        }
        let cell_width = spacing(&x);
        let cell_height = spacing(&y);
        Ok(Self {
            name: name.into(),
            values,
            x,
            y,
            cell_width,
            cell_height,
        })
    }

    pub fn cell_area(&self) -> f64 {
        self.cell_width * self.cell_height
    }
}

fn spacing(coords: &[f64]) -> f64 {
    match coords {
        [a, b, ..] if (b - a).abs() > 0.0 => (b - a).abs(),
        _ => 1.0,
    }
}

/// Statistics for one zone, before any temporal tags are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStats {
    pub zone_name: String,
    pub zone_code: i64,
    pub count: i64,
    pub area: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub mean: f64,
    pub std: f64,
    pub sum: f64,
}

/// The capabilities the pipeline consumes from a geospatial engine.
pub trait GeoEngine {
    /// Open dataset handle.
    type Dataset;

    /// Name of the optional module the zonal statistics depend on.
    fn capability_name(&self) -> &str {
        "zonal-statistics"
    }

    fn check_capability(&self) -> Capability;

    /// Reserve the capability. Only called when it is available.
    fn check_out(&self) -> Result<()>;

    /// Return a reserved capability.
    fn check_in(&self);

    fn open_dataset(&self, path: &Path) -> Result<Self::Dataset>;

    /// Dimension names in file order.
    fn list_dimensions(&self, dataset: &Self::Dataset) -> Vec<String>;

    fn dimension_size(&self, dataset: &Self::Dataset, name: &str) -> Result<usize>;

    fn dimension_value(&self, dataset: &Self::Dataset, name: &str, index: usize)
        -> Result<DimensionValue>;

    fn rasterize(&self, dataset: &Self::Dataset, request: &RasterRequest) -> Result<Raster>;

    fn zonal_stats(&self, zones: &ZoneLayer, zone_field: &str, raster: &Raster)
        -> Result<Vec<ZoneStats>>;
}

/// Holds a checked-out capability and checks it back in on drop.
pub struct CapabilityLease<'e, E: GeoEngine> {
    engine: &'e E,
}

impl<'e, E: GeoEngine> CapabilityLease<'e, E> {
    /// Check and reserve the engine capability.
    ///
    /// An unavailable capability is reported as `CapabilityUnavailable`
    /// without calling `check_out`.
    pub fn acquire(engine: &'e E) -> Result<Self> {
        if !engine.check_capability().available {
            return Err(ExtractError::CapabilityUnavailable {
                capability: engine.capability_name().to_string(),
            });
        }
        engine.check_out()?;
        tracing::debug!(capability = engine.capability_name(), "capability checked out");
        Ok(Self { engine })
    }
}

impl<E: GeoEngine> Drop for CapabilityLease<'_, E> {
    fn drop(&mut self) {
        self.engine.check_in();
        tracing::debug!(capability = self.engine.capability_name(), "capability checked in");
    }
}
