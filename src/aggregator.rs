//! Zonal aggregation of one raster against the zone layer.

use crate::engine::{GeoEngine, Raster, ZoneStats};
use crate::errors::{ExtractError, Result};
use crate::zones::ZoneLayer;

/// Per-zone statistics for `raster`, one row per zone with overlap.
///
/// Engine failures surface as `Aggregation` errors, and so does any row that
/// names a zone the layer does not contain.
pub fn aggregate<E: GeoEngine>(
    engine: &E,
    raster: &Raster,
    zones: &ZoneLayer,
    zone_field: &str,
) -> Result<Vec<ZoneStats>> {
    let rows = engine
        .zonal_stats(zones, zone_field, raster)
        .map_err(|e| match e {
            ExtractError::Aggregation { .. } => e,
            other => ExtractError::Aggregation {
                reason: other.to_string(),
            },
        })?;

    if let Some(stray) = rows.iter().find(|r| !zones.contains_name(&r.zone_name)) {
        return Err(ExtractError::Aggregation {
            reason: format!("engine returned unknown zone '{}'", stray.zone_name),
        });
    }

    tracing::trace!(raster = %raster.name, zones = rows.len(), "aggregated raster");
    Ok(rows)
}
