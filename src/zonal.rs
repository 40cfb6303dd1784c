//! Native zonal statistics
//!
//! A cell belongs to a zone when its center lies inside the zone polygon.
//! NaN cells are ignored. Zones that cover no valid cell produce no row.
//! Zones are independent, so they are reduced in parallel with Rayon.

use crate::engine::{Raster, ZoneStats};
use crate::zones::{Zone, ZoneLayer};
use geo::{Contains, Point};
use rayon::prelude::*;

/// Running moments for one zone.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: i64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn finish(self, zone: &Zone, cell_area: f64) -> Option<ZoneStats> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        // Population variance; clamp rounding noise below zero.
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        Some(ZoneStats {
            zone_name: zone.name.clone(),
            zone_code: zone.code,
            count: self.count,
            area: n * cell_area,
            min: self.min,
            max: self.max,
            range: self.max - self.min,
            mean,
            std: variance.sqrt(),
            sum: self.sum,
        })
    }
}

/// Compute per-zone statistics for one raster, ordered by zone code.
pub fn zonal_statistics(zones: &ZoneLayer, raster: &Raster) -> Vec<ZoneStats> {
    let cell_area = raster.cell_area();
    zones
        .zones()
        .par_iter()
        .filter_map(|zone| reduce_zone(zone, raster).finish(zone, cell_area))
        .collect()
}

fn reduce_zone(zone: &Zone, raster: &Raster) -> Accumulator {
    let mut acc = Accumulator::new();
    let Some(bounds) = zone.bounds else {
        return acc;
    };
    let (min, max) = (bounds.min(), bounds.max());

    for (row, &y) in raster.y.iter().enumerate() {
        if y < min.y || y > max.y {
            continue;
        }
        for (col, &x) in raster.x.iter().enumerate() {
            if x < min.x || x > max.x {
                continue;
            }
            let value = raster.values[[row, col]];
            if value.is_finite() && zone.geometry.contains(&Point::new(x, y)) {
                acc.push(value);
            }
        }
    }
    acc
}
