//! Zone polygon layer
//!
//! Zones are read from a GeoJSON FeatureCollection. Every feature must carry
//! a unique name in the configured property field; its position in the
//! collection (1-based) becomes the zone code.

use crate::errors::{ExtractError, Result};
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::Path;

/// One named zone.
#[derive(Debug, Clone)]
pub struct Zone {
    pub name: String,
    pub code: i64,
    pub geometry: MultiPolygon<f64>,
    pub bounds: Option<Rect<f64>>,
}

/// Read-only collection of zones keyed by one name field.
#[derive(Debug, Clone)]
pub struct ZoneLayer {
    field: String,
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<serde_json::Map<String, JsonValue>>,
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
    #[serde(other)]
    Unsupported,
}

impl ZoneLayer {
    /// Build a layer from already constructed zones.
    pub fn new(field: impl Into<String>, zones: Vec<(String, MultiPolygon<f64>)>) -> Result<Self> {
        let field = field.into();
        let mut seen = HashSet::new();
        let mut built = Vec::with_capacity(zones.len());
        for (i, (name, geometry)) in zones.into_iter().enumerate() {
            if !seen.insert(name.clone()) {
                return Err(ExtractError::ZoneLayer {
                    path: Default::default(),
                    reason: format!("duplicate zone name '{name}'"),
                });
            }
            let bounds = geometry.bounding_rect();
            built.push(Zone {
                name,
                code: i as i64 + 1,
                geometry,
                bounds,
            });
        }
        Ok(Self { field, zones: built })
    }

    /// Load a GeoJSON FeatureCollection, naming zones by `field`.
    pub fn from_geojson_path(path: &Path, field: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ExtractError::ZoneLayer {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_geojson_str(&text, field).map_err(|e| match e {
            ExtractError::ZoneLayer { reason, .. } => ExtractError::ZoneLayer {
                path: path.to_path_buf(),
                reason,
            },
            other => ExtractError::ZoneLayer {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })
    }

    pub fn from_geojson_str(text: &str, field: &str) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(text)?;
        let layer_err = |reason: String| ExtractError::ZoneLayer {
            path: Default::default(),
            reason,
        };

        let mut zones = Vec::with_capacity(collection.features.len());
        for (i, feature) in collection.features.into_iter().enumerate() {
            let name = feature
                .properties
                .as_ref()
                .and_then(|p| p.get(field))
                .and_then(property_text)
                .ok_or_else(|| layer_err(format!("feature {i} has no '{field}' property")))?;

            let geometry = match feature.geometry {
                Some(Geometry::Polygon { coordinates }) => MultiPolygon(vec![polygon(coordinates)]),
                Some(Geometry::MultiPolygon { coordinates }) => {
                    MultiPolygon(coordinates.into_iter().map(polygon).collect())
                }
                Some(Geometry::Unsupported) | None => {
                    return Err(layer_err(format!("zone '{name}' is not a polygon")));
                }
            };
            zones.push((name, geometry));
        }

        if zones.is_empty() {
            return Err(layer_err("layer has no features".to_string()));
        }
        Self::new(field, zones)
    }

    /// Name of the property that identifies zones.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.zones.iter().any(|z| z.name == name)
    }
}

fn property_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn polygon(rings: Vec<Vec<[f64; 2]>>) -> Polygon<f64> {
    let mut rings = rings.into_iter().map(|ring| {
        LineString::from(
            ring.into_iter()
                .map(|[x, y]| Coord { x, y })
                .collect::<Vec<_>>(),
        )
    });
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, rings.collect())
}
