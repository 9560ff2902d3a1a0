//! Shape parsing and GeoJSON rendering
//!
//! Filter values are either a `top,left,bottom,right` box or WKT.
//! Geometries leave the engine as GeoJSON values.

use std::str::FromStr;

use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use serde_json::{json, Value};
use wkt::ToWkt;

use super::bbox::BoundingBox;
use crate::errors::{ExploreError, ExploreResult};

/// Parses a spatial filter value
pub fn parse_shape(value: &str) -> ExploreResult<Geometry<f64>> {
    match parse_bbox(value)? {
        Some(bbox_geometry) => Ok(bbox_geometry),
        None => parse_wkt(value),
    }
}

/// Parses `top,left,bottom,right`; returns None when the value is not
/// shaped like a box.
fn parse_bbox(value: &str) -> ExploreResult<Option<Geometry<f64>>> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Ok(None);
    }
    let numbers: Vec<f64> = match parts.iter().map(|p| p.parse::<f64>()).collect() {
        Ok(numbers) => numbers,
        Err(_) => return Ok(None),
    };
    let (top, left, bottom, right) = (numbers[0], numbers[1], numbers[2], numbers[3]);

    let invalid = |reason: &str| {
        ExploreError::invalid_parameter(format!("Invalid bbox '{}': {}", value, reason))
    };
    if !(-90.0..=90.0).contains(&top) || !(-90.0..=90.0).contains(&bottom) {
        return Err(invalid("latitudes must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&left) || !(-180.0..=180.0).contains(&right) {
        return Err(invalid("longitudes must be within [-180, 180]"));
    }
    if top <= bottom {
        return Err(invalid("top must be greater than bottom"));
    }
    if left == right {
        return Err(invalid("left and right must differ"));
    }

    if left < right {
        return Ok(Some(Geometry::Polygon(
            BoundingBox::new(left, bottom, right, top).to_polygon(),
        )));
    }

    // Crosses the antimeridian
    let east_part = BoundingBox::new(left, bottom, 180.0, top).to_polygon();
    let west_part = BoundingBox::new(-180.0, bottom, right, top).to_polygon();
    Ok(Some(Geometry::MultiPolygon(MultiPolygon(vec![
        east_part, west_part,
    ]))))
}

/// Parses a WKT string
pub fn parse_wkt(value: &str) -> ExploreResult<Geometry<f64>> {
    wkt::Wkt::from_str(value.trim())
        .map_err(|e| ExploreError::invalid_parameter(format!("Invalid WKT '{}': {}", value, e)))
        .and_then(|w| {
            w.try_into().map_err(|e: wkt::conversion::Error| {
                ExploreError::invalid_parameter(format!("Invalid WKT '{}': {:?}", value, e))
            })
        })
}

/// Renders a geometry as WKT
pub fn to_wkt(geometry: &Geometry<f64>) -> String {
    geometry.wkt_string()
}

fn position(c: &Coord<f64>) -> Value {
    json!([c.x, c.y])
}

fn line_positions(line: &LineString<f64>) -> Value {
    Value::Array(line.coords().map(position).collect())
}

fn polygon_positions(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![line_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(line_positions));
    Value::Array(rings)
}

/// Renders a geometry as a GeoJSON geometry object
pub fn to_geojson(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": position(&p.0)}),
        Geometry::Line(l) => json!({
            "type": "LineString",
            "coordinates": [position(&l.start), position(&l.end)],
        }),
        Geometry::LineString(l) => json!({"type": "LineString", "coordinates": line_positions(l)}),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": polygon_positions(p)}),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.iter().map(|p| position(&p.0)).collect::<Vec<_>>(),
        }),
        Geometry::MultiLineString(ml) => json!({
            "type": "MultiLineString",
            "coordinates": ml.iter().map(line_positions).collect::<Vec<_>>(),
        }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.iter().map(polygon_positions).collect::<Vec<_>>(),
        }),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.iter().map(to_geojson).collect::<Vec<_>>(),
        }),
        Geometry::Rect(r) => to_geojson(&Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => to_geojson(&Geometry::Polygon(t.to_polygon())),
    }
}

/// GeoJSON point from a latitude/longitude pair
pub fn point(lat: f64, lon: f64) -> Value {
    json!({"type": "Point", "coordinates": [lon, lat]})
}

/// Normalizes a stored geometry value to GeoJSON.
///
/// Accepts GeoJSON objects, `{lat, lon}` objects, `[lon, lat]` arrays,
/// `"lat,lon"` strings and WKT strings.
pub fn normalize_geometry(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) if map.get("type").map_or(false, Value::is_string) => {
            Some(value.clone())
        }
        Value::Object(map) => {
            let lat = map.get("lat").and_then(Value::as_f64)?;
            let lon = map.get("lon").and_then(Value::as_f64)?;
            Some(point(lat, lon))
        }
        Value::Array(items) if items.len() == 2 => {
            let lon = items[0].as_f64()?;
            let lat = items[1].as_f64()?;
            Some(point(lat, lon))
        }
        Value::String(s) => {
            let parts: Vec<&str> = s.split(',').map(str::trim).collect();
            if parts.len() == 2 {
                if let (Ok(lat), Ok(lon)) = (parts[0].parse::<f64>(), parts[1].parse::<f64>()) {
                    return Some(point(lat, lon));
                }
            }
            parse_wkt(s).ok().map(|g| to_geojson(&g))
        }
        _ => None,
    }
}

/// Wraps a geometry in a single-feature FeatureCollection
pub fn feature_collection(geometry: Value) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": geometry,
            "properties": {},
        }],
    })
}
