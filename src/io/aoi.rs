//! Area-of-interest loading from GeoJSON files.

use std::path::Path;

use serde_json::Value;

use crate::raster::Region;
use crate::types::{FloodError, FloodResult};

fn ring_to_region(ring: &Value) -> FloodResult<Region> {
    let points = ring
        .as_array()
        .ok_or_else(|| FloodError::InvalidGeometry("polygon ring is not an array".to_string()))?;
    let mut vertices = Vec::with_capacity(points.len());
    for point in points {
        let coords = point.as_array().filter(|c| c.len() >= 2).ok_or_else(|| {
            FloodError::InvalidGeometry("ring vertex is not a coordinate pair".to_string())
        })?;
        let x = coords[0].as_f64();
        let y = coords[1].as_f64();
        match (x, y) {
            (Some(x), Some(y)) => vertices.push((x, y)),
            _ => {
                return Err(FloodError::InvalidGeometry(
                    "ring vertex coordinates are not numbers".to_string(),
                ))
            }
        }
    }
    Region::polygon(vertices)
}

fn geometry_to_region(geometry: &Value) -> FloodResult<Region> {
    let geom_type = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FloodError::InvalidGeometry("geometry has no type".to_string()))?;
    let coordinates = geometry
        .get("coordinates")
        .ok_or_else(|| FloodError::InvalidGeometry("geometry has no coordinates".to_string()))?;

    match geom_type {
        // Exterior ring of the (first) polygon
        "Polygon" => ring_to_region(coordinates.get(0).ok_or_else(|| {
            FloodError::InvalidGeometry("Polygon has no exterior ring".to_string())
        })?),
        "MultiPolygon" => {
            let first = coordinates
                .get(0)
                .and_then(|p| p.get(0))
                .ok_or_else(|| {
                    FloodError::InvalidGeometry("MultiPolygon has no polygons".to_string())
                })?;
            ring_to_region(first)
        }
        other => Err(FloodError::InvalidGeometry(format!(
            "unsupported geometry type '{}'; expected Polygon or MultiPolygon",
            other
        ))),
    }
}

/// Load an AOI polygon from a GeoJSON file.
///
/// Accepts a FeatureCollection (first feature used), a single Feature, or a
/// bare Polygon/MultiPolygon geometry. Coordinates are taken as-is and must
/// be in the working CRS of the imagery.
pub fn load_aoi_from_geojson<P: AsRef<Path>>(path: P) -> FloodResult<Region> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let json: Value = serde_json::from_str(&text).map_err(|e| {
        FloodError::InvalidGeometry(format!("invalid GeoJSON {}: {}", path.as_ref().display(), e))
    })?;

    let root_type = json
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FloodError::InvalidGeometry("GeoJSON has no type".to_string()))?;

    match root_type {
        "FeatureCollection" => {
            let geometry = json
                .get("features")
                .and_then(|f| f.get(0))
                .and_then(|f| f.get("geometry"))
                .ok_or_else(|| {
                    FloodError::InvalidGeometry("FeatureCollection has no features".to_string())
                })?;
            geometry_to_region(geometry)
        }
        "Feature" => {
            let geometry = json.get("geometry").ok_or_else(|| {
                FloodError::InvalidGeometry("Feature has no geometry".to_string())
            })?;
            geometry_to_region(geometry)
        }
        "Polygon" | "MultiPolygon" => geometry_to_region(&json),
        other => Err(FloodError::InvalidGeometry(format!(
            "unsupported GeoJSON type '{}'",
            other
        ))),
    }
}

/// Load an AOI, falling back to `default` with a warning when the file is
/// missing or malformed. A bad region source degrades, it does not abort.
pub fn load_aoi_or_default<P: AsRef<Path>>(path: P, default: &Region) -> Region {
    match load_aoi_from_geojson(path.as_ref()) {
        Ok(region) => {
            log::info!("AOI loaded from {}", path.as_ref().display());
            region
        }
        Err(e) => {
            log::warn!(
                "could not load AOI from {}: {}; using default region",
                path.as_ref().display(),
                e
            );
            default.clone()
        }
    }
}
