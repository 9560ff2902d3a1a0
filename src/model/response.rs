//! Canonical responses produced by the result assemblers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::aggregation::{CollectFunction, ComputationMetric};

/// One metric value of a bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationMetric {
    #[serde(rename = "type")]
    pub metric: CollectFunction,
    pub field: String,
    /// Scalar, or a single-feature FeatureCollection for geo metrics
    pub value: Value,
}

/// A geometry attached to a bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnedGeometry {
    /// Aggregated geometry kind or raw geometry path
    pub reference: String,
    /// GeoJSON geometry
    pub geometry: Value,
    pub is_raw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

/// A node of the aggregation response tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_other_doc_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totalnb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<AggregationMetric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometries: Vec<ReturnedGeometry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hits: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<AggregationResponse>,
}

impl AggregationResponse {
    /// Returns the sum of the immediate children's counts
    pub fn children_count(&self) -> u64 {
        self.elements.iter().filter_map(|e| e.count).sum()
    }

    /// One row per leaf bucket with `{name}_key`, `{name}_count` and
    /// `{name}_{fct}_{field}` columns for every level on the path.
    pub fn flatten(&self) -> Vec<BTreeMap<String, Value>> {
        let mut rows = Vec::new();
        for element in &self.elements {
            flatten_into(element, BTreeMap::new(), &mut rows);
        }
        rows
    }

    /// Renders the first-level buckets as GeoJSON features.
    ///
    /// A bucket gives one feature per returned geometry, or one feature
    /// located on its first geo metric when it has none. Buckets without
    /// any geometry are left out.
    pub fn to_feature_collection(&self) -> Value {
        let mut features = Vec::new();
        for bucket in &self.elements {
            bucket_features(bucket, &mut features);
        }
        json!({ "type": "FeatureCollection", "features": features })
    }
}

/// Geometry of a geo metric value wrapped as a FeatureCollection
fn metric_geometry(metric: &AggregationMetric) -> Option<&Value> {
    if !metric.metric.is_geo() {
        return None;
    }
    metric.value["features"][0]
        .get("geometry")
        .filter(|g| !g.is_null())
}

fn bucket_features(bucket: &AggregationResponse, features: &mut Vec<Value>) {
    let mut properties = Map::new();
    if let Some(key) = &bucket.key {
        properties.insert("key".to_string(), key.clone());
    }
    if let Some(key_as_string) = &bucket.key_as_string {
        properties.insert("key_as_string".to_string(), json!(key_as_string));
    }
    if let Some(count) = bucket.count {
        properties.insert("count".to_string(), json!(count));
    }
    for metric in bucket.metrics.iter().filter(|m| !m.metric.is_geo()) {
        properties.insert(
            format!("{}_{}", metric.metric.as_str(), metric.field.replace('.', "_")),
            metric.value.clone(),
        );
    }
    if !bucket.hits.is_empty() {
        properties.insert("hits".to_string(), json!(bucket.hits));
    }
    if !bucket.elements.is_empty() {
        properties.insert("elements".to_string(), json!(bucket.elements));
    }

    let mut push = |geometry: &Value, reference: &str, kind: &str, sort: Option<&String>| {
        let mut properties = properties.clone();
        properties.insert("geometry_ref".to_string(), json!(reference));
        properties.insert("geometry_type".to_string(), json!(kind));
        if let Some(sort) = sort {
            properties.insert("geometry_sort".to_string(), json!(sort));
        }
        features.push(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        }));
    };

    if !bucket.geometries.is_empty() {
        for returned in &bucket.geometries {
            let kind = if returned.is_raw { "raw" } else { "aggregated" };
            push(&returned.geometry, &returned.reference, kind, returned.sort.as_ref());
        }
        return;
    }
    // no requested geometry: localize on the first geo metric
    if let Some((metric, geometry)) = bucket
        .metrics
        .iter()
        .find_map(|m| metric_geometry(m).map(|g| (m, g)))
    {
        let reference = format!("{}_{}", metric.metric.as_str(), metric.field);
        push(geometry, &reference, "metric", None);
    }
}

fn flatten_into(
    node: &AggregationResponse,
    mut row: BTreeMap<String, Value>,
    rows: &mut Vec<BTreeMap<String, Value>>,
) {
    let name = node.name.as_deref().unwrap_or("bucket");
    if let Some(key) = &node.key {
        row.insert(format!("{}_key", name), key.clone());
    }
    if let Some(count) = node.count {
        row.insert(format!("{}_count", name), json!(count));
    }
    for metric in &node.metrics {
        row.insert(
            format!("{}_{}_{}", name, metric.metric.as_str(), metric.field.replace('.', "_")),
            metric.value.clone(),
        );
    }

    if node.elements.is_empty() {
        rows.push(row);
    } else {
        for child in &node.elements {
            flatten_into(child, row.clone(), rows);
        }
    }
}

/// Result of a single-value computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationResponse {
    pub field: String,
    pub metric: ComputationMetric,
    /// Numeric result, null when no row matched
    pub value: Option<f64>,
    /// Geometric result of geobbox/geocentroid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    pub totalnb: u64,
    pub query_time: u64,
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
    pub data: Value,
    /// Sort values of this hit, used to build cursors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
}

impl Hit {
    /// Comma-joined sort values
    pub fn cursor(&self) -> Option<String> {
        if self.sort.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .sort
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        Some(parts.join(","))
    }
}

/// A page of hits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    pub totalnb: u64,
    pub nbhits: usize,
    pub hits: Vec<Hit>,
    /// Cursor of the last hit, for the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Cursor of the first hit, for the previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl Hits {
    /// Builds a page and its cursors from hits in display order
    pub fn new(totalnb: u64, hits: Vec<Hit>) -> Self {
        let after = hits.last().and_then(Hit::cursor);
        let before = hits.first().and_then(Hit::cursor);
        Self {
            totalnb,
            nbhits: hits.len(),
            hits,
            after,
            before,
        }
    }

    /// Renders the hits as a GeoJSON FeatureCollection
    pub fn to_feature_collection(&self) -> Value {
        let features: Vec<Value> = self
            .hits
            .iter()
            .map(|hit| {
                let mut properties = match &hit.data {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                properties.insert("id".to_string(), hit.id.clone());
                json!({
                    "type": "Feature",
                    "geometry": hit.geometry.clone().or_else(|| hit.centroid.clone()),
                    "properties": properties,
                })
            })
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }
}
