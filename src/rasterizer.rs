//! Time-slice rasterization
//!
//! Turns one (time, level) position of a dataset into a 2-D raster. The
//! request pins dimensions by coordinate value rather than by index, since
//! dimension order inside the source files is not guaranteed.

use crate::config::ExtractConfig;
use crate::engine::{
    CellSampling, DimensionConstraint, DimensionValue, GeoEngine, RasterRequest, ValueSelection,
};
use crate::errors::{ExtractError, Result};
use crate::inspector::Dataset;
use crate::scratch::{ScratchRaster, ScratchWorkspace};

/// Fixed longitude/latitude mapping used for every slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRasterizer {
    x_dimension: String,
    y_dimension: String,
}

impl SliceRasterizer {
    pub fn new(x_dimension: impl Into<String>, y_dimension: impl Into<String>) -> Self {
        Self {
            x_dimension: x_dimension.into(),
            y_dimension: y_dimension.into(),
        }
    }

    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(&config.x_dimension, &config.y_dimension)
    }

    /// Build the by-value request for one time step.
    ///
    /// The level constraint is only added when the dataset carries the
    /// level dimension.
    pub fn request<E: GeoEngine>(
        &self,
        dataset: &Dataset<'_, E>,
        variable: &str,
        time_index: usize,
        level_value: i64,
    ) -> Result<RasterRequest> {
        let time_len = dataset.time_len()?;
        if time_index >= time_len {
            return Err(ExtractError::Rasterization {
                variable: variable.to_string(),
                reason: format!("time index {time_index} out of range (size {time_len})"),
            });
        }

        let mut constraints = vec![DimensionConstraint {
            dimension: dataset.time_dimension().to_string(),
            value: dataset.time_value(time_index)?,
        }];
        let level = dataset.level();
        if level.is_present() {
            constraints.push(DimensionConstraint {
                dimension: level.name.clone(),
                value: DimensionValue::Number(level_value as f64),
            });
        }

        Ok(RasterRequest {
            variable: variable.to_string(),
            x_dimension: self.x_dimension.clone(),
            y_dimension: self.y_dimension.clone(),
            constraints,
            selection: ValueSelection::ByValue,
            sampling: CellSampling::Center,
        })
    }

    /// Materialize one slice into the worker's scratch workspace.
    ///
    /// The returned guard must be dropped once the slice has been aggregated.
    pub fn rasterize<'w, E: GeoEngine>(
        &self,
        dataset: &Dataset<'_, E>,
        scratch: &'w ScratchWorkspace,
        variable: &str,
        time_index: usize,
        level_value: i64,
    ) -> Result<ScratchRaster<'w>> {
        let request = self.request(dataset, variable, time_index, level_value)?;
        let raster = dataset
            .engine()
            .rasterize(dataset.handle(), &request)
            .map_err(|e| match e {
                ExtractError::Rasterization { .. } => e,
                other => ExtractError::Rasterization {
                    variable: variable.to_string(),
                    reason: other.to_string(),
                },
            })?;
        Ok(scratch.adopt(raster))
    }
}
