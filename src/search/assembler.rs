//! Search result assembly
//!
//! Walks the bucketed JSON result level by level; the level at depth `d`
//! of the plan describes every bucket container found at depth `d`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::aggregations::{COMPUTATION, COMPUTATION_MAX, COMPUTATION_MIN};
use crate::errors::{ExploreError, ExploreResult};
use crate::geo::{normalize_geometry, point, BoundingBox};
use crate::model::{
    AggregatedGeometry, AggregationResponse, CollectFunction, CollectionReference,
    ComputationMetric, ComputationResponse, Hit, Hits, ReturnedGeometry,
};
use crate::planner::{
    aggregated_geometries, aggregated_geometry_name, as_count, bbox_polygon, bucket_node, metric,
    metric_source_name, other_doc_count, AggregationPlan, ResultAssembler, FETCHED_HITS,
};

/// Looks up a dotted path in a document
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(value) = document.get(path) {
        return Some(value);
    }
    path.split('.')
        .try_fold(document, |current, part| current.get(part))
        .filter(|v| !v.is_null())
}

/// `hits.total`, sent as a number or as `{value}`
fn total_hits(native: &Value) -> u64 {
    let total = &native["hits"]["total"];
    as_count(total)
        .or_else(|| as_count(&total["value"]))
        .unwrap_or(0)
}

/// Geometry of a `geo_bounds` result
fn bounds_geometry(result: &Value) -> Option<Value> {
    let bounds = result.get("bounds")?;
    let top_left = &bounds["top_left"];
    let bottom_right = &bounds["bottom_right"];
    let bbox = BoundingBox::new(
        top_left["lon"].as_f64()?,
        bottom_right["lat"].as_f64()?,
        bottom_right["lon"].as_f64()?,
        top_left["lat"].as_f64()?,
    );
    Some(bbox_polygon(&bbox))
}

/// Geometry of a `geo_centroid` result
fn centroid_geometry(result: &Value) -> Option<Value> {
    let location = result.get("location")?;
    Some(point(location["lat"].as_f64()?, location["lon"].as_f64()?))
}

/// Assembles search results for one collection
pub struct SearchAssembler {
    collection: Arc<CollectionReference>,
}

impl SearchAssembler {
    pub fn new(collection: Arc<CollectionReference>) -> Self {
        Self { collection }
    }

    fn buckets(
        &self,
        container: &Value,
        plan: &AggregationPlan,
        depth: usize,
    ) -> ExploreResult<Vec<AggregationResponse>> {
        let level = match plan.level(depth) {
            Some(level) => level,
            None => return Ok(Vec::new()),
        };
        let buckets = container["buckets"].as_array().ok_or_else(|| {
            ExploreError::backend(format!("Aggregation '{}' has no buckets", level.name))
        })?;

        buckets
            .iter()
            .map(|bucket| {
                let count = as_count(&bucket["doc_count"]).unwrap_or(0);
                let mut node = bucket_node(level, bucket["key"].clone(), count)?;
                if node.key_as_string.is_none() {
                    node.key_as_string = bucket["key_as_string"].as_str().map(str::to_string);
                }

                node.metrics = level
                    .metrics
                    .iter()
                    .map(|m| {
                        let result = &bucket[metric_source_name(m)];
                        let value = match m.function {
                            CollectFunction::GeoBBox => bounds_geometry(result),
                            CollectFunction::GeoCentroid => centroid_geometry(result),
                            _ => Some(result["value"].clone()),
                        }
                        .unwrap_or(Value::Null);
                        metric(m, value)
                    })
                    .collect();

                node.geometries = aggregated_geometries(level, &bucket["key"], |kind| {
                    let result = &bucket[aggregated_geometry_name(kind)];
                    match kind {
                        AggregatedGeometry::Bbox => bounds_geometry(result),
                        _ => centroid_geometry(result),
                    }
                })?;

                for group in &level.raw_geometries {
                    let hits = bucket[group.name.as_str()]["hits"]["hits"]
                        .as_array()
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    for hit in hits {
                        for path in &group.paths {
                            if let Some(geometry) = self.raw_geometry(&hit["_source"], path) {
                                node.geometries.push(ReturnedGeometry {
                                    reference: path.clone(),
                                    geometry,
                                    is_raw: true,
                                    sort: group.sort.clone(),
                                });
                            }
                        }
                    }
                }

                if level.fetch_hits.is_some() {
                    node.hits = bucket[FETCHED_HITS]["hits"]["hits"]
                        .as_array()
                        .map(|hits| hits.iter().map(|h| h["_source"].clone()).collect())
                        .unwrap_or_default();
                }

                if let Some(child) = plan.level(depth + 1) {
                    let child_container = bucket.get(child.name.as_str()).ok_or_else(|| {
                        ExploreError::backend(format!(
                            "Bucket of '{}' has no '{}' aggregation",
                            level.name, child.name
                        ))
                    })?;
                    node.sum_other_doc_count = other_doc_count(
                        child,
                        as_count(&child_container["sum_other_doc_count"]),
                    );
                    node.elements = self.buckets(child_container, plan, depth + 1)?;
                }
                Ok(node)
            })
            .collect()
    }

    /// Geometry at `path`, falling back to the collection centroid
    fn raw_geometry(&self, source: &Value, path: &str) -> Option<Value> {
        lookup(source, path)
            .and_then(normalize_geometry)
            .or_else(|| lookup(source, &self.collection.centroid_path).and_then(normalize_geometry))
    }

    fn hit(&self, raw: &Value) -> Hit {
        let source = &raw["_source"];
        let collection = &self.collection;
        let custom: BTreeMap<String, Value> = collection
            .custom_paths
            .iter()
            .filter_map(|(name, path)| lookup(source, path).map(|v| (name.clone(), v.clone())))
            .collect();

        Hit {
            id: lookup(source, &collection.id_path)
                .cloned()
                .unwrap_or_else(|| raw["_id"].clone()),
            geometry: lookup(source, &collection.geometry_path).and_then(normalize_geometry),
            centroid: lookup(source, &collection.centroid_path).and_then(normalize_geometry),
            timestamp: lookup(source, &collection.timestamp_path).cloned(),
            custom,
            data: source.clone(),
            sort: raw["sort"].as_array().cloned().unwrap_or_default(),
        }
    }
}

impl ResultAssembler for SearchAssembler {
    type Native = Value;

    fn assemble_aggregation(
        &self,
        native: &Value,
        plan: &AggregationPlan,
    ) -> ExploreResult<AggregationResponse> {
        let first = plan
            .level(0)
            .ok_or_else(|| ExploreError::bad_request("At least one aggregation is required"))?;
        let container = native["aggregations"].get(first.name.as_str()).ok_or_else(|| {
            ExploreError::backend(format!("Result has no '{}' aggregation", first.name))
        })?;

        Ok(AggregationResponse {
            name: Some(first.name.clone()),
            totalnb: Some(total_hits(native)),
            sum_other_doc_count: other_doc_count(
                first,
                as_count(&container["sum_other_doc_count"]),
            ),
            elements: self.buckets(container, plan, 0)?,
            ..Default::default()
        })
    }

    fn assemble_hits(&self, native: &Value, reverse: bool) -> ExploreResult<Hits> {
        let raw_hits = native["hits"]["hits"]
            .as_array()
            .ok_or_else(|| ExploreError::backend("Result has no hits"))?;
        let mut hits: Vec<Hit> = raw_hits.iter().map(|h| self.hit(h)).collect();
        if reverse {
            hits.reverse();
        }
        Ok(Hits::new(total_hits(native), hits))
    }

    fn assemble_computation(
        &self,
        native: &Value,
        field: &str,
        metric: ComputationMetric,
    ) -> ExploreResult<ComputationResponse> {
        let totalnb = total_hits(native);
        let aggs = &native["aggregations"];
        let mut response = ComputationResponse {
            field: field.to_string(),
            metric,
            value: None,
            geometry: None,
            totalnb,
            query_time: 0,
        };
        if totalnb == 0 {
            return Ok(response);
        }

        match metric {
            ComputationMetric::Spanning => {
                let min = aggs[COMPUTATION_MIN]["value"].as_f64();
                let max = aggs[COMPUTATION_MAX]["value"].as_f64();
                response.value = min.zip(max).map(|(min, max)| max - min);
            }
            ComputationMetric::GeoBBox => response.geometry = bounds_geometry(&aggs[COMPUTATION]),
            ComputationMetric::GeoCentroid => {
                response.geometry = centroid_geometry(&aggs[COMPUTATION])
            }
            _ => response.value = aggs[COMPUTATION]["value"].as_f64(),
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_lookup_dotted_paths() {
        let doc = json!({"a": {"b": {"c": 1}}, "x.y": 2});
        assert_eq!(lookup(&doc, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup(&doc, "x.y"), Some(&json!(2)));
        assert_eq!(lookup(&doc, "a.z"), None);
    }

    #[test]
    fn test_total_hits_forms() {
        assert_eq!(total_hits(&json!({"hits": {"total": 7}})), 7);
        assert_eq!(total_hits(&json!({"hits": {"total": {"value": 9, "relation": "eq"}}})), 9);
        assert_eq!(total_hits(&json!({})), 0);
    }

    #[test]
    fn test_bounds_geometry() {
        let geometry = bounds_geometry(&json!({"bounds": {
            "top_left": {"lat": 10.0, "lon": -5.0},
            "bottom_right": {"lat": 0.0, "lon": 5.0},
        }}))
        .unwrap();
        assert_eq!(geometry["type"], "Polygon");
        assert!(bounds_geometry(&json!({})).is_none());
    }
}
