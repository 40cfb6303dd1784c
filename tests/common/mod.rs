//! Shared fixtures: a file-driven mock engine and a two-zone layer.
//!
//! Mock inputs are small JSON documents describing a time axis and a grid,
//! so tests control malformed files, failing slices and slow workers
//! without touching the NetCDF library.

#![allow(dead_code)]

use nc_zonal::config::ExtractConfig;
use nc_zonal::engine::{
    Capability, DimensionValue, GeoEngine, Raster, RasterRequest, ZoneStats,
};
use nc_zonal::errors::{ExtractError, Result};
use nc_zonal::zonal::zonal_statistics;
use nc_zonal::zones::ZoneLayer;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SCENARIO_TIMES: [&str; 3] = [
    "01/01/2020 00:00:00 AM",
    "01/02/2020 00:00:00 AM",
    "01/03/2020 00:00:00 AM",
];

/// Content of a mock input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDataset {
    pub times: Vec<String>,
    /// Size of the level dimension, absent when `None`.
    #[serde(default)]
    pub level_size: Option<usize>,
    /// Rows follow `y`, columns follow `x`.
    pub grid: Vec<Vec<f64>>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(default)]
    pub fail_rasterize_at: Vec<usize>,
    #[serde(default)]
    pub fail_aggregate_at: Vec<usize>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl MockDataset {
    /// 2x2 grid, one row per zone of [`two_zone_geojson`].
    pub fn with_times(times: &[&str]) -> Self {
        Self {
            times: times.iter().map(|t| t.to_string()).collect(),
            level_size: Some(1),
            grid: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            x: vec![0.0, 1.0],
            y: vec![0.0, 1.0],
            fail_rasterize_at: Vec::new(),
            fail_aggregate_at: Vec::new(),
            delay_ms: 0,
        }
    }

    pub fn scenario() -> Self {
        Self::with_times(&SCENARIO_TIMES)
    }
}

/// Engine whose datasets are JSON files on disk.
#[derive(Debug, Clone)]
pub struct MockEngine {
    pub available: bool,
    pub checkouts: Arc<AtomicUsize>,
    pub checkins: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            available: true,
            checkouts: Arc::new(AtomicUsize::new(0)),
            checkins: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }
}

fn time_index(dataset: &MockDataset, request: &RasterRequest) -> Result<usize> {
    let constraint = request
        .constraints
        .iter()
        .find(|c| c.dimension == "time")
        .ok_or_else(|| ExtractError::Rasterization {
            variable: request.variable.clone(),
            reason: "no time constraint".to_string(),
        })?;
    dataset
        .times
        .iter()
        .position(|t| DimensionValue::Text(t.clone()).matches(&constraint.value))
        .ok_or_else(|| ExtractError::Rasterization {
            variable: request.variable.clone(),
            reason: format!("no time equal to '{}'", constraint.value),
        })
}

impl GeoEngine for MockEngine {
    type Dataset = MockDataset;

    fn check_capability(&self) -> Capability {
        Capability {
            available: self.available,
        }
    }

    fn check_out(&self) -> Result<()> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_in(&self) {
        self.checkins.fetch_add(1, Ordering::SeqCst);
    }

    fn open_dataset(&self, path: &Path) -> Result<MockDataset> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ExtractError::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn list_dimensions(&self, dataset: &MockDataset) -> Vec<String> {
        let mut dims = vec!["time".to_string()];
        if dataset.level_size.is_some() {
            dims.push("projection".to_string());
        }
        dims.push("latitude".to_string());
        dims.push("longitude".to_string());
        dims
    }

    fn dimension_size(&self, dataset: &MockDataset, name: &str) -> Result<usize> {
        match name {
            "time" => Ok(dataset.times.len()),
            "projection" => dataset.level_size.ok_or_else(|| ExtractError::Format {
                path: PathBuf::new(),
                reason: "no projection".to_string(),
            }),
            "latitude" => Ok(dataset.y.len()),
            "longitude" => Ok(dataset.x.len()),
            other => Err(ExtractError::Format {
                path: PathBuf::new(),
                reason: format!("no dimension {other}"),
            }),
        }
    }

    fn dimension_value(&self, dataset: &MockDataset, name: &str, index: usize) -> Result<DimensionValue> {
        match name {
            "time" => dataset
                .times
                .get(index)
                .map(|t| DimensionValue::Text(t.clone()))
                .ok_or_else(|| ExtractError::Format {
                    path: PathBuf::new(),
                    reason: "time index out of range".to_string(),
                }),
            _ => Ok(DimensionValue::Number(index as f64)),
        }
    }

    fn rasterize(&self, dataset: &MockDataset, request: &RasterRequest) -> Result<Raster> {
        let index = time_index(dataset, request)?;
        if dataset.delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(dataset.delay_ms));
        }
        if dataset.fail_rasterize_at.contains(&index) {
            return Err(ExtractError::Rasterization {
                variable: request.variable.clone(),
                reason: format!("injected failure at {index}"),
            });
        }
        let rows = dataset.grid.len();
        let cols = dataset.grid.first().map_or(0, Vec::len);
        let flat: Vec<f64> = dataset
            .grid
            .iter()
            .flatten()
            .map(|v| v + index as f64)
            .collect();
        let values = Array2::from_shape_vec((rows, cols), flat)?;
        let name = if dataset.fail_aggregate_at.contains(&index) {
            format!("fail_{index}")
        } else {
            format!("t{index}")
        };
        Raster::new(name, values, dataset.x.clone(), dataset.y.clone())
    }

    fn zonal_stats(&self, zones: &ZoneLayer, _zone_field: &str, raster: &Raster) -> Result<Vec<ZoneStats>> {
        if raster.name.starts_with("fail_") {
            return Err(ExtractError::Aggregation {
                reason: format!("injected failure for {}", raster.name),
            });
        }
        Ok(zonal_statistics(zones, raster))
    }
}

/// Two zones: "South" covers y = 0, "North" covers y = 1.
pub fn two_zone_geojson() -> String {
    r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": { "NAME": "South" },
      "geometry": { "type": "Polygon", "coordinates": [[[-0.5, -0.5], [1.5, -0.5], [1.5, 0.5], [-0.5, 0.5], [-0.5, -0.5]]] }
    },
    {
      "type": "Feature",
      "properties": { "NAME": "North" },
      "geometry": { "type": "Polygon", "coordinates": [[[-0.5, 0.5], [1.5, 0.5], [1.5, 1.5], [-0.5, 1.5], [-0.5, 0.5]]] }
    }
  ]
}"#
    .to_string()
}

pub fn write_zones(dir: &Path) -> PathBuf {
    let path = dir.join("zones.geojson");
    std::fs::write(&path, two_zone_geojson()).expect("write zones");
    path
}

pub fn write_mock_input(dir: &Path, name: &str, dataset: &MockDataset) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(dataset).expect("serialize mock")).expect("write input");
    path
}

/// Input, output and zone paths inside `root`.
pub fn test_config(root: &Path) -> ExtractConfig {
    let input = root.join("inputs");
    let output = root.join("outputs");
    std::fs::create_dir_all(&input).expect("create inputs");
    let zones = write_zones(root);
    let mut config = ExtractConfig::new(input, output, zones);
    config.workers = Some(2);
    config.worker_timeout_secs = 30;
    config
}

pub fn load_zones(config: &ExtractConfig) -> ZoneLayer {
    ZoneLayer::from_geojson_path(&config.zones, &config.zone_field).expect("load zones")
}
