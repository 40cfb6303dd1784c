//! Built-in engine backed by the `netcdf` crate
//!
//! Coordinate values are read once when a dataset is opened. CF time axes
//! (`<unit> since <reference>`) are rendered as text using the configured
//! primary time format, so the rest of the pipeline only ever sees formatted
//! timestamps for the time dimension.

use super::{
    Capability, DimensionValue, GeoEngine, Raster, RasterRequest, ZoneStats,
};
use crate::config::ExtractConfig;
use crate::errors::{ExtractError, Result};
use crate::zonal::zonal_statistics;
use crate::zones::ZoneLayer;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::Array2;
use netcdf::{AttributeValue, File, Variable};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Open NetCDF file plus its cached coordinate axes.
pub struct NetcdfDataset {
    path: PathBuf,
    file: File,
    dimensions: Vec<(String, usize)>,
    coordinates: HashMap<String, Vec<DimensionValue>>,
}

impl NetcdfDataset {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// NetCDF-backed implementation of [`GeoEngine`]
#[derive(Debug, Clone)]
pub struct NetcdfEngine {
    time_dimension: String,
    time_format: String,
}

impl NetcdfEngine {
    pub fn new(time_dimension: impl Into<String>, time_format: impl Into<String>) -> Self {
        Self {
            time_dimension: time_dimension.into(),
            time_format: time_format.into(),
        }
    }

    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(&config.time_dimension, &config.primary_time_format)
    }

    fn read_axis(&self, file: &File, name: &str, len: usize) -> Vec<DimensionValue> {
        let Some(var) = file.variable(name) else {
            return index_axis(len);
        };
        if var.dimensions().len() != 1 {
            return index_axis(len);
        }
        let raw = match var.get_values::<f64, _>(..) {
            Ok(values) => values,
            Err(e) => {
                tracing::debug!(dimension = name, error = %e, "coordinate variable not numeric, using indices");
                return index_axis(len);
            }
        };

        if name == self.time_dimension {
            if let Some(units) = string_attribute(&var, "units") {
                match render_cf_times(&units, &raw, &self.time_format) {
                    Some(rendered) => return rendered.into_iter().map(DimensionValue::Text).collect(),
                    None => tracing::warn!(units = %units, "unrecognised time units, keeping raw values"),
                }
            }
        }

        raw.into_iter().map(DimensionValue::Number).collect()
    }

    fn index_of_value(
        &self,
        dataset: &NetcdfDataset,
        variable: &str,
        dimension: &str,
        value: &DimensionValue,
    ) -> Result<usize> {
        let axis = dataset
            .coordinates
            .get(dimension)
            .ok_or_else(|| ExtractError::Rasterization {
                variable: variable.to_string(),
                reason: format!("dimension '{dimension}' not found"),
            })?;
        axis.iter()
            .position(|candidate| candidate.matches(value))
            .ok_or_else(|| ExtractError::Rasterization {
                variable: variable.to_string(),
                reason: format!("no '{dimension}' coordinate equal to '{value}'"),
            })
    }
}

impl GeoEngine for NetcdfEngine {
    type Dataset = NetcdfDataset;

    fn check_capability(&self) -> Capability {
        Capability { available: true }
    }

    fn check_out(&self) -> Result<()> {
        Ok(())
    }

    fn check_in(&self) {}

    fn open_dataset(&self, path: &Path) -> Result<NetcdfDataset> {
        let file = netcdf::open(path).map_err(|e| ExtractError::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let dimensions: Vec<(String, usize)> = file
            .dimensions()
            .map(|d| (d.name().to_string(), d.len()))
            .collect();

        let coordinates = dimensions
            .iter()
            .map(|(name, len)| (name.clone(), self.read_axis(&file, name, *len)))
            .collect();

        Ok(NetcdfDataset {
            path: path.to_path_buf(),
            file,
            dimensions,
            coordinates,
        })
    }

    fn list_dimensions(&self, dataset: &NetcdfDataset) -> Vec<String> {
        dataset.dimensions.iter().map(|(name, _)| name.clone()).collect()
    }

    fn dimension_size(&self, dataset: &NetcdfDataset, name: &str) -> Result<usize> {
        dataset
            .dimensions
            .iter()
            .find(|(dim, _)| dim == name)
            .map(|(_, len)| *len)
            .ok_or_else(|| ExtractError::Format {
                path: dataset.path.clone(),
                reason: format!("dimension '{name}' not found"),
            })
    }

    fn dimension_value(
        &self,
        dataset: &NetcdfDataset,
        name: &str,
        index: usize,
    ) -> Result<DimensionValue> {
        dataset
            .coordinates
            .get(name)
            .and_then(|axis| axis.get(index))
            .cloned()
            .ok_or_else(|| ExtractError::Format {
                path: dataset.path.clone(),
                reason: format!("no value at index {index} of dimension '{name}'"),
            })
    }

    fn rasterize(&self, dataset: &NetcdfDataset, request: &RasterRequest) -> Result<Raster> {
        let variable = &request.variable;
        let raster_err = |reason: String| ExtractError::Rasterization {
            variable: variable.clone(),
            reason,
        };

        let var = dataset
            .file
            .variable(variable)
            .ok_or_else(|| raster_err(format!("variable not found in {}", dataset.path.display())))?;

        let var_dims: Vec<(String, usize)> = var
            .dimensions()
            .iter()
            .map(|d| (d.name().to_string(), d.len()))
            .collect();

        let x_axis = var_dims
            .iter()
            .position(|(name, _)| *name == request.x_dimension)
            .ok_or_else(|| raster_err(format!("missing x dimension '{}'", request.x_dimension)))?;
        let y_axis = var_dims
            .iter()
            .position(|(name, _)| *name == request.y_dimension)
            .ok_or_else(|| raster_err(format!("missing y dimension '{}'", request.y_dimension)))?;

        let mut ranges: Vec<Range<usize>> = Vec::with_capacity(var_dims.len());
        for (name, len) in &var_dims {
            if *name == request.x_dimension || *name == request.y_dimension {
                ranges.push(0..*len);
            } else if let Some(constraint) = request.constraints.iter().find(|c| c.dimension == *name) {
                let index = self.index_of_value(dataset, variable, name, &constraint.value)?;
                ranges.push(index..index + 1);
            } else if *len == 1 {
                ranges.push(0..1);
            } else {
                return Err(raster_err(format!(
                    "dimension '{name}' has {len} values and no constraint"
                )));
            }
        }

        let data = read_ranges(&var, &ranges)?;
        let nx = var_dims[x_axis].1;
        let ny = var_dims[y_axis].1;

        let mut grid = if y_axis < x_axis {
            Array2::from_shape_vec((ny, nx), data)?
        } else {
            Array2::from_shape_vec((nx, ny), data)?.reversed_axes()
        };

        let fill = fill_value(&var);
        grid.mapv_inplace(|v| if is_missing(v, fill) { f64::NAN } else { v });

        let packing = Packing::of(&var);
        if !packing.is_identity() {
            tracing::debug!(
                variable = %variable,
                scale_factor = packing.scale_factor,
                add_offset = packing.add_offset,
                "unpacking values"
            );
            grid.mapv_inplace(|v| packing.unpack(v));
        }

        let x = numeric_axis(&dataset.coordinates, &request.x_dimension, nx);
        let y = numeric_axis(&dataset.coordinates, &request.y_dimension, ny);

        let constraint_label: Vec<String> = request
            .constraints
            .iter()
            .map(|c| format!("{}={}", c.dimension, c.value))
            .collect();
        let name = format!("{variable}[{}]", constraint_label.join(","));

        Raster::new(name, grid, x, y).map_err(|e| raster_err(e.to_string()))
    }

    fn zonal_stats(
        &self,
        zones: &ZoneLayer,
        zone_field: &str,
        raster: &Raster,
    ) -> Result<Vec<ZoneStats>> {
        if zones.field() != zone_field {
            return Err(ExtractError::Aggregation {
                reason: format!(
                    "zone layer is keyed by '{}', not '{zone_field}'",
                    zones.field()
                ),
            });
        }
        Ok(zonal_statistics(zones, raster))
    }
}

fn index_axis(len: usize) -> Vec<DimensionValue> {
    (0..len).map(|i| DimensionValue::Number(i as f64)).collect()
}

fn numeric_axis(coordinates: &HashMap<String, Vec<DimensionValue>>, name: &str, len: usize) -> Vec<f64> {
    match coordinates.get(name) {
        Some(axis) if axis.len() == len => axis
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                DimensionValue::Number(n) => *n,
                DimensionValue::Text(_) => i as f64,
            })
            .collect(),
        _ => (0..len).map(|i| i as f64).collect(),
    }
}

/// Read a hyperslab given one range per variable dimension.
fn read_ranges(var: &Variable, ranges: &[Range<usize>]) -> Result<Vec<f64>> {
    let values = match ranges {
        [a] => var.get_values::<f64, _>(a.clone())?,
        [a, b] => var.get_values::<f64, _>((a.clone(), b.clone()))?,
        [a, b, c] => var.get_values::<f64, _>((a.clone(), b.clone(), c.clone()))?,
        [a, b, c, d] => var.get_values::<f64, _>((a.clone(), b.clone(), c.clone(), d.clone()))?,
        _ => {
            return Err(ExtractError::Rasterization {
                variable: var.name().to_string(),
                reason: format!("unsupported number of dimensions ({})", ranges.len()),
            })
        }
    };
    Ok(values)
}

fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn numeric_attribute(var: &Variable, name: &str) -> Option<f64> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        _ => None,
    }
}

fn fill_value(var: &Variable) -> Option<f64> {
    ["_FillValue", "missing_value"]
        .iter()
        .find_map(|name| numeric_attribute(var, name))
}

/// Default fill of NetCDF `double` variables.
const NC_FILL_DOUBLE: f64 = 9.969_209_968_386_869e36;
/// Default fill of NetCDF `float` variables.
const NC_FILL_FLOAT: f32 = NC_FILL_DOUBLE as f32;

/// True for the declared fill value or, without one, the library default
/// fill of floating-point variables.
fn is_missing(value: f64, fill: Option<f64>) -> bool {
    match fill {
        Some(fill) => value == fill,
        None => value == NC_FILL_DOUBLE || value == f64::from(NC_FILL_FLOAT),
    }
}

/// CF packing attributes (`scale_factor`, `add_offset`).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Packing {
    scale_factor: f64,
    add_offset: f64,
}

impl Packing {
    fn of(var: &Variable) -> Self {
        Self {
            scale_factor: numeric_attribute(var, "scale_factor").unwrap_or(1.0),
            add_offset: numeric_attribute(var, "add_offset").unwrap_or(0.0),
        }
    }

    fn is_identity(&self) -> bool {
        self.scale_factor == 1.0 && self.add_offset == 0.0
    }

    /// NaN stays NaN.
    fn unpack(&self, packed: f64) -> f64 {
        packed * self.scale_factor + self.add_offset
    }
}

/// Render CF-style offsets (`days since 2020-01-01`) with `format`.
///
/// Returns `None` when the units string is not of the `<unit> since <date>` form.
pub fn render_cf_times(units: &str, offsets: &[f64], format: &str) -> Option<Vec<String>> {
    let mut parts = units.trim().splitn(3, ' ');
    let unit = parts.next()?.to_ascii_lowercase();
    if parts.next()? != "since" {
        return None;
    }
    let reference = parse_reference(parts.next()?.trim())?;

    let seconds_per_unit = match unit.as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        _ => return None,
    };

    offsets
        .iter()
        .map(|&offset| {
            let millis = (offset * seconds_per_unit * 1000.0).round() as i64;
            reference
                .checked_add_signed(Duration::milliseconds(millis))
                .map(|t| t.format(format).to_string())
        })
        .collect()
}

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim_end_matches('Z').trim_end_matches(" UTC");
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(t);
        }
    }
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
