//! Relational result assembly

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::aggregations::{
    bbox_columns, centroid_columns, key_column, COUNT_COLUMN, TOTAL_COLUMN, VALUE_COLUMN,
};
use super::compiler::{
    level_statement_name, sort_column, CENTROID_COLUMN, COMPUTATION_STATEMENT, COUNT_STATEMENT,
    GEOMETRY_COLUMN, HITS_STATEMENT,
};
use crate::errors::{ExploreError, ExploreResult};
use crate::geo::{normalize_geometry, point, BoundingBox};
use crate::model::{
    AggregatedGeometry, AggregationResponse, CollectFunction, CollectionReference,
    ComputationMetric, ComputationResponse, Hit, Hits,
};
use crate::planner::{
    aggregated_geometries, aggregated_geometry_name, as_count, bbox_polygon, bucket_node, metric,
    metric_source_name, other_doc_count, AggregationKind, AggregationPlan, ResultAssembler,
};

pub type Row = Map<String, Value>;

/// Rows returned by each statement of a plan, keyed by statement purpose
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqlRows(pub BTreeMap<String, Vec<Row>>);

impl SqlRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, purpose: impl Into<String>, rows: Vec<Row>) -> Self {
        self.0.insert(purpose.into(), rows);
        self
    }

    pub fn rows(&self, purpose: &str) -> ExploreResult<&[Row]> {
        self.0
            .get(purpose)
            .map(Vec::as_slice)
            .ok_or_else(|| ExploreError::backend(format!("No rows for statement '{}'", purpose)))
    }

    fn total(&self, purpose: &str) -> ExploreResult<u64> {
        Ok(self
            .rows(purpose)?
            .first()
            .and_then(|row| row.get(TOTAL_COLUMN))
            .and_then(as_count)
            .unwrap_or(0))
    }
}

/// Reads a number sent as a number or a numeric string
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric strings become numbers, anything else is kept
fn normalize_number(value: &Value) -> Value {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| number(value).and_then(|f| serde_json::Number::from_f64(f).map(Value::Number)))
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

fn read_bbox(row: &Row, name: &str) -> Option<BoundingBox> {
    let [west, south, east, north] = bbox_columns(name);
    let get = |column: &str| row.get(column).and_then(number);
    Some(BoundingBox::new(
        get(&west)?,
        get(&south)?,
        get(&east)?,
        get(&north)?,
    ))
}

fn read_centroid(row: &Row, name: &str) -> Option<Value> {
    let [lon, lat] = centroid_columns(name);
    Some(point(
        row.get(&lat).and_then(number)?,
        row.get(&lon).and_then(number)?,
    ))
}

/// GeoJSON column, sent as text or as a JSON object
fn geojson(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| normalize_geometry(&v)),
        other => normalize_geometry(other),
    }
}

/// Assembles relational results for one collection
pub struct SqlAssembler {
    collection: Arc<CollectionReference>,
}

impl SqlAssembler {
    pub fn new(collection: Arc<CollectionReference>) -> Self {
        Self { collection }
    }

    fn buckets(
        &self,
        native: &SqlRows,
        plan: &AggregationPlan,
        depth: usize,
        parents: &[Value],
    ) -> ExploreResult<Vec<AggregationResponse>> {
        let level = match plan.level(depth) {
            Some(level) => level,
            None => return Ok(Vec::new()),
        };
        let rows = native.rows(&level_statement_name(depth))?;

        let mut nodes = Vec::new();
        for row in rows {
            let keys: Vec<Value> = (0..=depth)
                .map(|d| {
                    let key = row.get(&key_column(d)).cloned().unwrap_or(Value::Null);
                    match plan.levels[d].kind {
                        AggregationKind::DateHistogram { .. } | AggregationKind::Histogram { .. } => {
                            normalize_number(&key)
                        }
                        _ => key,
                    }
                })
                .collect();
            if keys[..depth] != *parents {
                continue;
            }
            let key = keys[depth].clone();
            let count = row.get(COUNT_COLUMN).and_then(as_count).unwrap_or(0);
            let mut node = bucket_node(level, key.clone(), count)?;

            node.metrics = level
                .metrics
                .iter()
                .map(|m| {
                    let name = metric_source_name(m);
                    let value = match m.function {
                        CollectFunction::GeoBBox => read_bbox(row, &name).map(|b| bbox_polygon(&b)),
                        CollectFunction::GeoCentroid => read_centroid(row, &name),
                        _ => row.get(&name).map(normalize_number),
                    }
                    .unwrap_or(Value::Null);
                    metric(m, value)
                })
                .collect();

            node.geometries = aggregated_geometries(level, &key, |kind| {
                let name = aggregated_geometry_name(kind);
                match kind {
                    AggregatedGeometry::Bbox => read_bbox(row, &name).map(|b| bbox_polygon(&b)),
                    _ => read_centroid(row, &name),
                }
            })?;

            if let Some(child) = plan.level(depth + 1) {
                node.sum_other_doc_count = other_doc_count(child, None);
                node.elements = self.buckets(native, plan, depth + 1, &keys)?;
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    fn hit(&self, row: &Row) -> Hit {
        let collection = &self.collection;
        let geometry = geojson(row.get(GEOMETRY_COLUMN));
        let centroid = geojson(row.get(CENTROID_COLUMN));

        let sort: Vec<Value> = (0..)
            .map(sort_column)
            .map_while(|column| row.get(&column).cloned())
            .collect();

        let mut data: Row = row
            .iter()
            .filter(|(column, _)| {
                column.as_str() != GEOMETRY_COLUMN
                    && column.as_str() != CENTROID_COLUMN
                    && !column.starts_with("_sort_")
            })
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        for (path, value) in [
            (&collection.geometry_path, &geometry),
            (&collection.centroid_path, &centroid),
        ] {
            match value {
                Some(value) => data.insert(path.clone(), value.clone()),
                None => data.remove(path),
            };
        }

        let custom: BTreeMap<String, Value> = collection
            .custom_paths
            .iter()
            .filter_map(|(name, path)| row.get(path).map(|v| (name.clone(), v.clone())))
            .collect();

        Hit {
            id: row.get(&collection.id_path).cloned().unwrap_or(Value::Null),
            geometry,
            centroid,
            timestamp: row
                .get(&collection.timestamp_path)
                .filter(|v| !v.is_null())
                .cloned(),
            custom,
            data: Value::Object(data),
            sort,
        }
    }
}

impl ResultAssembler for SqlAssembler {
    type Native = SqlRows;

    fn assemble_aggregation(
        &self,
        native: &SqlRows,
        plan: &AggregationPlan,
    ) -> ExploreResult<AggregationResponse> {
        let first = plan
            .level(0)
            .ok_or_else(|| ExploreError::bad_request("At least one aggregation is required"))?;
        Ok(AggregationResponse {
            name: Some(first.name.clone()),
            totalnb: Some(native.total(COUNT_STATEMENT)?),
            sum_other_doc_count: other_doc_count(first, None),
            elements: self.buckets(native, plan, 0, &[])?,
            ..Default::default()
        })
    }

    fn assemble_hits(&self, native: &SqlRows, reverse: bool) -> ExploreResult<Hits> {
        let mut hits: Vec<Hit> = native
            .rows(HITS_STATEMENT)?
            .iter()
            .map(|row| self.hit(row))
            .collect();
        if reverse {
            hits.reverse();
        }
        Ok(Hits::new(native.total(COUNT_STATEMENT)?, hits))
    }

    fn assemble_computation(
        &self,
        native: &SqlRows,
        field: &str,
        metric: ComputationMetric,
    ) -> ExploreResult<ComputationResponse> {
        let totalnb = native.total(COMPUTATION_STATEMENT)?;
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

        let row = match native.rows(COMPUTATION_STATEMENT)?.first() {
            Some(row) => row,
            None => return Ok(response),
        };
        match metric {
            ComputationMetric::GeoBBox => {
                response.geometry = read_bbox(row, VALUE_COLUMN).map(|b| bbox_polygon(&b))
            }
            ComputationMetric::GeoCentroid => {
                response.geometry = read_centroid(row, VALUE_COLUMN)
            }
            _ => response.value = row.get(VALUE_COLUMN).and_then(number),
        }
        Ok(response)
    }
}
