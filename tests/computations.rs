//! Computation Tests
//!
//! Tests for single-value computations run through `ExploreService::compute`:
//! - scalar, spanning and geometric results on the search backend
//! - the same results read from SQL rows
//! - null values when nothing matches
//! - validation and backend failures

use std::cell::RefCell;
use std::sync::Arc;

use geoexplore::errors::{ExploreError, ExploreErrorCode, ExploreResult};
use geoexplore::executor::ExploreService;
use geoexplore::model::{
    CollectionReference, ComputationMetric, ComputationRequest, FieldType, FilterExpression,
    FilterRequest, Operator, StaticFieldTypes,
};
use geoexplore::planner::{BackendClient, CompilerContext, Scalar};
use geoexplore::search::{SearchBackend, SearchPlan};
use geoexplore::sql::{Row, SqlBackend, SqlPlan, SqlRows};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn context() -> CompilerContext {
    let collection =
        CollectionReference::new("flights", "flights", "id", "track", "position", "timestamp");
    let types = StaticFieldTypes::new()
        .with_field("id", FieldType::Keyword)
        .with_field("airline", FieldType::Keyword)
        .with_field("speed", FieldType::Double)
        .with_field("track", FieldType::LineString)
        .with_field("position", FieldType::GeoPoint)
        .with_field("timestamp", FieldType::Date);
    CompilerContext::new(Arc::new(collection), Arc::new(types))
}

fn computation(field: &str, metric: ComputationMetric) -> ComputationRequest {
    ComputationRequest {
        filter: FilterRequest::new()
            .filter(vec![FilterExpression::new("airline", Operator::Eq, "AF")]),
        field: field.to_string(),
        metric,
    }
}

/// Returns a canned native result and records the plans it was given
struct Canned<N> {
    native: N,
    plans: RefCell<Vec<Value>>,
}

impl<N: Clone> Canned<N> {
    fn new(native: N) -> Self {
        Self {
            native,
            plans: RefCell::new(Vec::new()),
        }
    }
}

impl BackendClient<SearchPlan, Value> for Canned<Value> {
    fn execute(&self, plan: &SearchPlan) -> ExploreResult<Value> {
        self.plans.borrow_mut().push(serde_json::to_value(plan).unwrap());
        Ok(self.native.clone())
    }
}

impl BackendClient<SqlPlan, SqlRows> for Canned<SqlRows> {
    fn execute(&self, plan: &SqlPlan) -> ExploreResult<SqlRows> {
        self.plans.borrow_mut().push(serde_json::to_value(plan).unwrap());
        Ok(self.native.clone())
    }
}

struct Unreachable;

impl<P, N> BackendClient<P, N> for Unreachable {
    fn execute(&self, _plan: &P) -> ExploreResult<N> {
        Err(ExploreError::backend("connection refused"))
    }
}

fn search_result(total: u64, aggregations: Value) -> Value {
    json!({
        "hits": {"total": {"value": total, "relation": "eq"}, "hits": []},
        "aggregations": aggregations
    })
}

fn computation_rows(value: Value) -> SqlRows {
    let row: Row = match value {
        Value::Object(map) => map,
        _ => Row::new(),
    };
    SqlRows::new().with_rows("computation", vec![row])
}

// =============================================================================
// Search Backend Tests
// =============================================================================

#[test]
fn test_search_average() {
    let client = Canned::new(search_result(4, json!({"computation": {"value": 412.5}})));
    let service = ExploreService::new(SearchBackend, &client, context());

    let response = service
        .compute(&computation("speed", ComputationMetric::Avg))
        .unwrap();
    assert_eq!(response.field, "speed");
    assert_eq!(response.metric, ComputationMetric::Avg);
    assert_eq!(response.value, Some(412.5));
    assert_eq!(response.geometry, None);
    assert_eq!(response.totalnb, 4);

    let plans = client.plans.borrow();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["body"]["size"], 0);
    assert_eq!(
        plans[0]["body"]["aggs"]["computation"],
        json!({"avg": {"field": "speed"}})
    );
    assert_eq!(
        plans[0]["body"]["query"]["bool"]["filter"][0],
        json!({"terms": {"airline": ["AF"]}})
    );
}

/// Spanning is the distance between the smallest and largest value.
#[test]
fn test_search_spanning() {
    let client = Canned::new(search_result(
        3,
        json!({
            "computation_min": {"value": 1000.0},
            "computation_max": {"value": 4600.0}
        }),
    ));
    let service = ExploreService::new(SearchBackend, &client, context());

    let response = service
        .compute(&computation("timestamp", ComputationMetric::Spanning))
        .unwrap();
    assert_eq!(response.value, Some(3600.0));
    assert_eq!(response.totalnb, 3);
}

#[test]
fn test_search_geobbox() {
    let client = Canned::new(search_result(
        2,
        json!({"computation": {"bounds": {
            "top_left": {"lat": 49.0, "lon": 2.0},
            "bottom_right": {"lat": 48.0, "lon": 3.0}
        }}}),
    ));
    let service = ExploreService::new(SearchBackend, &client, context());

    let response = service
        .compute(&computation("position", ComputationMetric::GeoBBox))
        .unwrap();
    assert_eq!(response.value, None);
    let geometry = response.geometry.unwrap();
    assert_eq!(geometry["type"], "Polygon");
    let ring = geometry["coordinates"][0].as_array().unwrap();
    assert!(ring.contains(&json!([2.0, 49.0])));
    assert!(ring.contains(&json!([3.0, 48.0])));
}

#[test]
fn test_search_geocentroid() {
    let client = Canned::new(search_result(
        2,
        json!({"computation": {"location": {"lat": 48.85, "lon": 2.35}, "count": 2}}),
    ));
    let service = ExploreService::new(SearchBackend, &client, context());

    let response = service
        .compute(&computation("position", ComputationMetric::GeoCentroid))
        .unwrap();
    assert_eq!(
        response.geometry,
        Some(json!({"type": "Point", "coordinates": [2.35, 48.85]}))
    );
}

/// No matching document gives a null value, whatever the backend sends.
#[test]
fn test_search_nothing_matched() {
    let client = Canned::new(search_result(0, json!({"computation": {"value": 0.0}})));
    let service = ExploreService::new(SearchBackend, &client, context());

    let response = service
        .compute(&computation("speed", ComputationMetric::Sum))
        .unwrap();
    assert_eq!(response.totalnb, 0);
    assert_eq!(response.value, None);

    let client = Canned::new(search_result(0, json!({"computation": {"bounds": null}})));
    let service = ExploreService::new(SearchBackend, &client, context());
    let response = service
        .compute(&computation("position", ComputationMetric::GeoBBox))
        .unwrap();
    assert_eq!(response.geometry, None);
    assert_eq!(response.value, None);
}

// =============================================================================
// SQL Backend Tests
// =============================================================================

#[test]
fn test_sql_average() {
    let client = Canned::new(computation_rows(json!({"totalnb": 4, "value": "412.5"})));
    let service = ExploreService::new(SqlBackend, &client, context());

    let response = service
        .compute(&computation("speed", ComputationMetric::Avg))
        .unwrap();
    assert_eq!(response.value, Some(412.5));
    assert_eq!(response.totalnb, 4);

    let plans = client.plans.borrow();
    let statement = &plans[0]["statements"][0];
    assert_eq!(statement["purpose"], "computation");
    let sql = statement["sql"].as_str().unwrap();
    assert!(sql.contains(r#"COUNT(*) AS "totalnb""#));
    assert!(sql.contains(r#"AVG("speed") AS "value""#));
    assert!(sql.contains(r#""airline" = $1"#));
    assert_eq!(
        statement["params"],
        serde_json::to_value(vec![Scalar::Text("AF".to_string())]).unwrap()
    );
}

#[test]
fn test_sql_spanning_and_centroid() {
    let client = Canned::new(computation_rows(json!({"totalnb": 3, "value": 3600})));
    let service = ExploreService::new(SqlBackend, &client, context());
    let response = service
        .compute(&computation("timestamp", ComputationMetric::Spanning))
        .unwrap();
    assert_eq!(response.value, Some(3600.0));

    let client = Canned::new(computation_rows(
        json!({"totalnb": 2, "value_lon": 2.35, "value_lat": 48.85}),
    ));
    let service = ExploreService::new(SqlBackend, &client, context());
    let response = service
        .compute(&computation("position", ComputationMetric::GeoCentroid))
        .unwrap();
    assert_eq!(
        response.geometry,
        Some(json!({"type": "Point", "coordinates": [2.35, 48.85]}))
    );
    assert_eq!(response.value, None);
}

#[test]
fn test_sql_nothing_matched() {
    let client = Canned::new(computation_rows(json!({"totalnb": 0, "value": null})));
    let service = ExploreService::new(SqlBackend, &client, context());

    let response = service
        .compute(&computation("speed", ComputationMetric::Max))
        .unwrap();
    assert_eq!(response.totalnb, 0);
    assert_eq!(response.value, None);
    assert_eq!(response.geometry, None);
}

// =============================================================================
// Failure Tests
// =============================================================================

/// Validation fails before the backend is called.
#[test]
fn test_unsuitable_field() {
    let client = Canned::new(search_result(1, json!({})));
    let service = ExploreService::new(SearchBackend, &client, context());

    let err = service
        .compute(&computation("track", ComputationMetric::Avg))
        .unwrap_err();
    assert_eq!(err.code(), ExploreErrorCode::InvalidParameter);

    let err = service
        .compute(&computation("speed", ComputationMetric::GeoCentroid))
        .unwrap_err();
    assert_eq!(err.code(), ExploreErrorCode::InvalidParameter);

    let err = service
        .compute(&computation(" ", ComputationMetric::Min))
        .unwrap_err();
    assert_eq!(err.code(), ExploreErrorCode::BadRequest);
    assert!(client.plans.borrow().is_empty());
}

#[test]
fn test_backend_failure_names_collection() {
    let service = ExploreService::new(SqlBackend, Unreachable, context());
    let err = service
        .compute(&computation("speed", ComputationMetric::Avg))
        .unwrap_err();
    assert_eq!(err.code(), ExploreErrorCode::Backend);
    assert_eq!(err.message(), "flights: connection refused");
}
