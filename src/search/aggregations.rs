//! Aggregation rendering for the search DSL
//!
//! Each level becomes one bucket aggregation named after the level; metrics,
//! aggregated geometries, raw geometries and fetched hits are its sub
//! aggregations, next to the aggregation of the following level.

use serde_json::{json, Map, Value};

use super::filters::sort_clauses;
use crate::model::{
    AggregatedGeometry, CollectFunction, CollectionReference, ComputationMetric, Order,
};
use crate::planner::{
    aggregated_geometry_name, AggregationKind, AggregationLevel, AggregationPlan, BucketOrder,
    FETCHED_HITS,
};

/// Name of the computation sub-aggregation
pub const COMPUTATION: &str = "computation";
pub const COMPUTATION_MIN: &str = "computation_min";
pub const COMPUTATION_MAX: &str = "computation_max";

fn order_str(order: Order) -> &'static str {
    match order {
        Order::Asc => "asc",
        Order::Desc => "desc",
    }
}

fn bucket_order(order: &BucketOrder) -> Value {
    match order {
        BucketOrder::Key(o) => json!({"_key": order_str(*o)}),
        BucketOrder::Count(o) => json!({"_count": order_str(*o)}),
        BucketOrder::Metric { name, order } => json!({name: order_str(*order)}),
    }
}

fn metric_aggregation(function: CollectFunction, field: &str) -> Value {
    match function {
        CollectFunction::GeoBBox => json!({"geo_bounds": {"field": field}}),
        CollectFunction::GeoCentroid => json!({"geo_centroid": {"field": field}}),
        other => json!({other.as_str(): {"field": field}}),
    }
}

fn bucket_aggregation(level: &AggregationLevel) -> Value {
    let field = level.field.as_str();
    let mut body = Map::new();
    body.insert("field".to_string(), json!(field));

    let agg_name = match level.kind {
        AggregationKind::DateHistogram { unit, multiplier } => {
            if unit.is_calendar() {
                body.insert(
                    "calendar_interval".to_string(),
                    json!(format!("1{}", unit.suffix())),
                );
            } else {
                body.insert(
                    "fixed_interval".to_string(),
                    json!(format!("{}{}", multiplier, unit.suffix())),
                );
            }
            "date_histogram"
        }
        AggregationKind::Histogram { interval } => {
            body.insert("interval".to_string(), json!(interval));
            "histogram"
        }
        AggregationKind::Term => {
            if let Some(include) = &level.include {
                body.insert("include".to_string(), json!(include));
            }
            "terms"
        }
        AggregationKind::Geohash { precision } => {
            body.insert("precision".to_string(), json!(precision));
            "geohash_grid"
        }
        AggregationKind::Geotile { precision } => {
            body.insert("precision".to_string(), json!(precision));
            "geotile_grid"
        }
    };

    if let Some(size) = level.size {
        body.insert("size".to_string(), json!(size));
    }
    if let Some(order) = &level.order {
        body.insert("order".to_string(), bucket_order(order));
    }

    json!({agg_name: body})
}

fn level_aggregation(
    plan: &AggregationPlan,
    depth: usize,
    collection: &CollectionReference,
) -> Option<(String, Value)> {
    let level = plan.level(depth)?;
    let mut aggregation = bucket_aggregation(level);
    let mut subs = Map::new();

    for metric in level.own_metrics() {
        subs.insert(metric.name.clone(), metric_aggregation(metric.function, &metric.field));
    }

    for geometry in level.computed_geometries() {
        let function = match geometry {
            AggregatedGeometry::Bbox => CollectFunction::GeoBBox,
            _ => CollectFunction::GeoCentroid,
        };
        subs.insert(
            aggregated_geometry_name(geometry),
            metric_aggregation(function, &collection.centroid_path),
        );
    }

    for group in &level.raw_geometries {
        let mut top_hits = Map::new();
        top_hits.insert("size".to_string(), json!(1));
        // the centroid stands in for documents without the geometry
        let mut includes = group.paths.clone();
        if !includes.contains(&collection.centroid_path) {
            includes.push(collection.centroid_path.clone());
        }
        top_hits.insert("_source".to_string(), json!({"includes": includes}));
        if !group.sort_keys.is_empty() {
            top_hits.insert(
                "sort".to_string(),
                json!(sort_clauses(&group.sort_keys, &collection.centroid_path)),
            );
        }
        subs.insert(group.name.clone(), json!({"top_hits": top_hits}));
    }

    if let Some(fetch) = &level.fetch_hits {
        let mut top_hits = Map::new();
        top_hits.insert("size".to_string(), json!(fetch.size));
        if !fetch.include.is_empty() {
            top_hits.insert("_source".to_string(), json!({"includes": fetch.include}));
        }
        if !fetch.sort_keys.is_empty() {
            top_hits.insert(
                "sort".to_string(),
                json!(sort_clauses(&fetch.sort_keys, &collection.centroid_path)),
            );
        }
        subs.insert(FETCHED_HITS.to_string(), json!({"top_hits": top_hits}));
    }

    if let Some((child_name, child)) = level_aggregation(plan, depth + 1, collection) {
        subs.insert(child_name, child);
    }

    if !subs.is_empty() {
        if let Value::Object(map) = &mut aggregation {
            map.insert("aggs".to_string(), Value::Object(subs));
        }
    }
    Some((level.name.clone(), aggregation))
}

/// Renders the `aggs` section of an aggregation plan
pub fn aggregations(plan: &AggregationPlan, collection: &CollectionReference) -> Value {
    let mut aggs = Map::new();
    if let Some((name, aggregation)) = level_aggregation(plan, 0, collection) {
        aggs.insert(name, aggregation);
    }
    Value::Object(aggs)
}

/// Renders the `aggs` section of a computation
pub fn computation(field: &str, metric: ComputationMetric) -> Value {
    match metric {
        ComputationMetric::Spanning => json!({
            COMPUTATION_MIN: {"min": {"field": field}},
            COMPUTATION_MAX: {"max": {"field": field}},
        }),
        ComputationMetric::GeoBBox => json!({COMPUTATION: {"geo_bounds": {"field": field}}}),
        ComputationMetric::GeoCentroid => json!({COMPUTATION: {"geo_centroid": {"field": field}}}),
        other => json!({COMPUTATION: {other.as_str(): {"field": field}}}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AggregationSpec, AggregationType, FieldType, OrderOn, StaticFieldTypes};

    fn compile(specs: &[AggregationSpec]) -> (AggregationPlan, CollectionReference) {
        let collection =
            CollectionReference::new("flights", "flights", "id", "track", "position", "timestamp");
        let types = StaticFieldTypes::new()
            .with_field("id", FieldType::Keyword)
            .with_field("airline", FieldType::Keyword)
            .with_field("speed", FieldType::Double)
            .with_field("timestamp", FieldType::Date)
            .with_field("position", FieldType::GeoPoint)
            .with_field("track", FieldType::GeoShape);
        let plan = AggregationPlan::compile(specs, &collection, &types, true).unwrap();
        (plan, collection)
    }

    #[test]
    fn test_nested_levels() {
        let (plan, collection) = compile(&[
            AggregationSpec::new(AggregationType::Geohash)
                .interval("3")
                .aggregated_geometry(AggregatedGeometry::Centroid)
                .metric(CollectFunction::GeoCentroid, "position"),
            AggregationSpec::new(AggregationType::Term)
                .field("airline")
                .size(5)
                .metric(CollectFunction::Avg, "speed")
                .order(Order::Desc, OrderOn::Result),
        ]);
        let aggs = aggregations(&plan, &collection);
        let geohash = &aggs["geohash_0"];
        assert_eq!(geohash["geohash_grid"]["precision"], 3);
        assert!(geohash["geohash_grid"].get("order").is_none());
        // the centroid metric reuses the aggregated geometry
        assert!(geohash["aggs"].get("geocentroid_position").is_none());
        assert_eq!(
            geohash["aggs"]["centroid_aggregated_geometry"],
            json!({"geo_centroid": {"field": "position"}})
        );

        let term = &geohash["aggs"]["term_1"];
        assert_eq!(term["terms"]["size"], 5);
        assert_eq!(term["terms"]["order"], json!({"avg_speed": "desc"}));
        assert_eq!(term["aggs"]["avg_speed"], json!({"avg": {"field": "speed"}}));
    }

    #[test]
    fn test_date_intervals() {
        let (plan, collection) = compile(&[AggregationSpec::new(AggregationType::DateHistogram)
            .interval("1month")
            .aggregated_geometry(AggregatedGeometry::Bbox)]);
        let aggs = aggregations(&plan, &collection);
        assert_eq!(aggs["datehistogram_0"]["date_histogram"]["calendar_interval"], "1M");
        assert_eq!(aggs["datehistogram_0"]["date_histogram"]["order"], json!({"_key": "asc"}));

        let (plan, collection) = compile(&[AggregationSpec::new(AggregationType::DateHistogram)
            .interval("6h")
            .aggregated_geometry(AggregatedGeometry::Bbox)]);
        let aggs = aggregations(&plan, &collection);
        assert_eq!(aggs["datehistogram_0"]["date_histogram"]["fixed_interval"], "6h");
    }

    #[test]
    fn test_raw_geometries_and_fetch_hits() {
        let (plan, collection) = compile(&[AggregationSpec::new(AggregationType::Geotile)
            .interval("6")
            .raw_geometry("track", Some("-timestamp"))
            .fetch_hits(3, &["id", "-timestamp"])]);
        let aggs = &aggregations(&plan, &collection)["geotile_0"]["aggs"];
        assert_eq!(aggs["raw_geometries_0"]["top_hits"]["size"], 1);
        assert_eq!(
            aggs["raw_geometries_0"]["top_hits"]["sort"],
            json!([{"timestamp": {"order": "desc"}}])
        );
        assert_eq!(
            aggs["raw_geometries_0"]["top_hits"]["_source"]["includes"],
            json!(["track", "position"])
        );
        assert_eq!(aggs["fetched_hits"]["top_hits"]["size"], 3);
        assert_eq!(
            aggs["fetched_hits"]["top_hits"]["_source"]["includes"],
            json!(["id", "timestamp"])
        );
    }

    #[test]
    fn test_computation_aggs() {
        let aggs = computation("speed", ComputationMetric::Spanning);
        assert_eq!(aggs["computation_min"], json!({"min": {"field": "speed"}}));
        assert_eq!(aggs["computation_max"], json!({"max": {"field": "speed"}}));
        let aggs = computation("speed", ComputationMetric::Cardinality);
        assert_eq!(aggs["computation"], json!({"cardinality": {"field": "speed"}}));
    }
}
