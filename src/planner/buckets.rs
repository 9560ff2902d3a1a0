//! Bucket decoding shared by the result assemblers
//!
//! Both backends hand over a bucket key, a document count and the raw
//! values of the level's metrics; the canonical node is built here so the
//! two response trees cannot drift apart.

use serde_json::Value;

use super::aggregation::{
    aggregated_geometry_name, AggregationKind, AggregationLevel, MetricSource, PlannedMetric,
};
use super::dates::format_epoch_millis;
use crate::errors::{ExploreError, ExploreResult};
use crate::geo::{feature_collection, geohash_to_bbox, point, to_geojson, BoundingBox, Tile};
use crate::model::{
    AggregatedGeometry, AggregationMetric, AggregationResponse, AggregationType, ReturnedGeometry,
};

/// GeoJSON polygon of a bounding box
pub fn bbox_polygon(bbox: &BoundingBox) -> Value {
    to_geojson(&geo_types::Geometry::Polygon(bbox.to_polygon()))
}

/// GeoJSON point at the center of a bounding box
pub fn bbox_center(bbox: &BoundingBox) -> Value {
    let c = bbox.centroid();
    point(c.y(), c.x())
}

/// Cell of a geohash or geotile key
pub fn cell_bbox(kind: AggregationKind, key: &Value) -> ExploreResult<Option<BoundingBox>> {
    let key_str = || {
        key.as_str().ok_or_else(|| {
            ExploreError::backend(format!("Expected a string cell key, got {}", key))
        })
    };
    match kind {
        AggregationKind::Geohash { .. } => geohash_to_bbox(key_str()?).map(Some),
        AggregationKind::Geotile { .. } => Tile::parse(key_str()?).map(|t| Some(t.bbox())),
        _ => Ok(None),
    }
}

/// Starts a node from its key and count
pub fn bucket_node(level: &AggregationLevel, key: Value, count: u64) -> ExploreResult<AggregationResponse> {
    let key_as_string = match level.kind {
        AggregationKind::DateHistogram { .. } => {
            let millis = key
                .as_i64()
                .or_else(|| key.as_f64().map(|f| f as i64))
                .ok_or_else(|| {
                    ExploreError::backend(format!(
                        "Expected an epoch millisecond key in '{}', got {}",
                        level.name, key
                    ))
                })?;
            Some(format_epoch_millis(millis, &level.format)?)
        }
        _ => None,
    };

    Ok(AggregationResponse {
        name: Some(level.name.clone()),
        key: Some(key),
        key_as_string,
        count: Some(count),
        ..Default::default()
    })
}

/// Aggregated geometries of a node in requested order. `computed` looks
/// up the value of a bbox or centroid sub-result.
pub fn aggregated_geometries<F>(
    level: &AggregationLevel,
    key: &Value,
    computed: F,
) -> ExploreResult<Vec<ReturnedGeometry>>
where
    F: Fn(AggregatedGeometry) -> Option<Value>,
{
    if level.aggregated_geometries.is_empty() {
        return Ok(Vec::new());
    }
    let cell = cell_bbox(level.kind, key)?;

    let mut geometries = Vec::new();
    for geometry in &level.aggregated_geometries {
        let value = match (geometry, &cell) {
            (AggregatedGeometry::Cell, Some(bbox)) => Some(bbox_polygon(bbox)),
            (AggregatedGeometry::CellCenter, Some(bbox)) => Some(bbox_center(bbox)),
            (AggregatedGeometry::Cell | AggregatedGeometry::CellCenter, None) => None,
            (computed_kind, _) => computed(*computed_kind),
        };
        if let Some(value) = value {
            geometries.push(ReturnedGeometry {
                reference: geometry.as_str().to_string(),
                geometry: value,
                is_raw: false,
                sort: None,
            });
        }
    }
    Ok(geometries)
}

/// Name of the sub-result holding a metric's value
pub fn metric_source_name(metric: &PlannedMetric) -> String {
    match metric.source {
        MetricSource::Own => metric.name.clone(),
        MetricSource::AggregatedGeometry(geometry) => aggregated_geometry_name(geometry),
    }
}

/// Builds a metric; geo values are wrapped in a FeatureCollection
pub fn metric(metric: &PlannedMetric, value: Value) -> AggregationMetric {
    let value = if metric.function.is_geo() && !value.is_null() {
        feature_collection(value)
    } else {
        value
    };
    AggregationMetric {
        metric: metric.function,
        field: metric.field.clone(),
        value,
    }
}

/// `sum_other_doc_count` reported for a container of `level`
pub fn other_doc_count(level: &AggregationLevel, tracked: Option<u64>) -> Option<u64> {
    if level.agg_type() == AggregationType::Term {
        Some(tracked.unwrap_or(0))
    } else {
        None
    }
}

/// Reads a count sent as a number or a numeric string
pub fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
}
