//! Condition rendering for the search DSL

use serde_json::{json, Map, Value};

use crate::geo::to_geojson;
use crate::planner::{Condition, ConditionGroup, ConditionSet, SortKey, ValueRange};

const EPOCH_MILLIS_FORMAT: &str = "epoch_millis";

/// Escapes the wildcard query metacharacters of a literal
fn escape_wildcard(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('*', "\\*")
        .replace('?', "\\?")
}

fn range_bounds(range: &ValueRange, is_date: bool) -> Value {
    let mut bounds = Map::new();
    let lower = if range.min_inclusive { "gte" } else { "gt" };
    let upper = if range.max_inclusive { "lte" } else { "lt" };
    bounds.insert(lower.to_string(), range.min.to_json());
    bounds.insert(upper.to_string(), range.max.to_json());
    if is_date {
        bounds.insert("format".to_string(), json!(EPOCH_MILLIS_FORMAT));
    }
    Value::Object(bounds)
}

fn must_not(query: Value) -> Value {
    json!({"bool": {"must_not": [query]}})
}

/// Renders one condition as a query clause
pub fn condition_query(condition: &Condition) -> Value {
    match condition {
        Condition::In { field, values } => {
            json!({"terms": {field: values.iter().map(|v| v.to_json()).collect::<Vec<_>>()}})
        }
        Condition::NotIn { field, values } => must_not(
            json!({"terms": {field: values.iter().map(|v| v.to_json()).collect::<Vec<_>>()}}),
        ),
        Condition::Compare {
            field,
            op,
            value,
            is_date,
        } => {
            let mut bounds = Map::new();
            bounds.insert(op.as_str().to_string(), value.to_json());
            if *is_date {
                bounds.insert("format".to_string(), json!(EPOCH_MILLIS_FORMAT));
            }
            json!({"range": {field: bounds}})
        }
        Condition::Like { field, pattern } => {
            json!({"wildcard": {field: {"value": format!("*{}*", escape_wildcard(pattern))}}})
        }
        Condition::Ranges {
            field,
            ranges,
            is_date,
        } => {
            let clauses: Vec<Value> = ranges
                .iter()
                .map(|r| json!({"range": {field: range_bounds(r, *is_date)}}))
                .collect();
            if clauses.len() == 1 {
                clauses.into_iter().next().unwrap_or(Value::Null)
            } else {
                json!({"bool": {"should": clauses, "minimum_should_match": 1}})
            }
        }
        Condition::Spatial {
            field,
            relation,
            negated,
            shape,
        } => {
            let query = json!({"geo_shape": {field: {
                "shape": to_geojson(shape),
                "relation": relation.as_str(),
            }}});
            if *negated {
                must_not(query)
            } else {
                query
            }
        }
        Condition::Text {
            field: Some(field),
            text,
        } => json!({"match": {field: {"query": text, "operator": "and"}}}),
        Condition::Text { field: None, text } => {
            json!({"query_string": {"query": text, "default_operator": "and"}})
        }
    }
}

/// Renders an OR-group
pub fn group_query(group: &ConditionGroup) -> Value {
    let clauses: Vec<Value> = group.conditions().iter().map(condition_query).collect();
    if clauses.len() == 1 {
        clauses.into_iter().next().unwrap_or(Value::Null)
    } else {
        json!({"bool": {"should": clauses, "minimum_should_match": 1}})
    }
}

/// Renders AND-ed groups as the top-level query
pub fn filter_query(set: &ConditionSet) -> Value {
    if set.is_empty() {
        return json!({"match_all": {}});
    }
    let filters: Vec<Value> = set.groups().iter().map(group_query).collect();
    json!({"bool": {"filter": filters}})
}

/// Renders sort keys; geo distances are measured from `centroid_path`
pub fn sort_clauses(keys: &[SortKey], centroid_path: &str) -> Vec<Value> {
    keys.iter()
        .map(|key| {
            let order = if key.is_descending() { "desc" } else { "asc" };
            match key {
                SortKey::Field { field, .. } => json!({field: {"order": order}}),
                SortKey::GeoDistance { lat, lon, .. } => json!({"_geo_distance": {
                    centroid_path: {"lat": lat, "lon": lon},
                    "order": order,
                    "unit": "m",
                }}),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{parse_sort, Comparison, Scalar};

    #[test]
    fn test_terms_and_negation() {
        let condition = Condition::NotIn {
            field: "status".to_string(),
            values: vec![Scalar::Text("A".into())],
        };
        assert_eq!(
            condition_query(&condition),
            json!({"bool": {"must_not": [{"terms": {"status": ["A"]}}]}})
        );
    }

    #[test]
    fn test_date_compare_declares_format() {
        let condition = Condition::Compare {
            field: "timestamp".to_string(),
            op: Comparison::Gte,
            value: Scalar::Integer(10),
            is_date: true,
        };
        assert_eq!(
            condition_query(&condition),
            json!({"range": {"timestamp": {"gte": 10, "format": "epoch_millis"}}})
        );
    }

    #[test]
    fn test_range_flags() {
        let condition = Condition::Ranges {
            field: "speed".to_string(),
            ranges: vec![ValueRange {
                min: Scalar::Integer(1),
                max: Scalar::Integer(2),
                min_inclusive: false,
                max_inclusive: true,
            }],
            is_date: false,
        };
        assert_eq!(
            condition_query(&condition),
            json!({"range": {"speed": {"gt": 1, "lte": 2}}})
        );
    }

    #[test]
    fn test_or_group_uses_should() {
        let group = ConditionGroup(vec![
            Condition::Like {
                field: "name".to_string(),
                pattern: "air".to_string(),
            },
            Condition::Text {
                field: None,
                text: "late".to_string(),
            },
        ]);
        let query = group_query(&group);
        assert_eq!(query["bool"]["minimum_should_match"], 1);
        assert_eq!(query["bool"]["should"][0]["wildcard"]["name"]["value"], "*air*");
    }

    #[test]
    fn test_like_escapes_wildcards() {
        let condition = Condition::Like {
            field: "name".to_string(),
            pattern: "a*b?c\\".to_string(),
        };
        assert_eq!(
            condition_query(&condition)["wildcard"]["name"]["value"],
            "*a\\*b\\?c\\\\*"
        );
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert_eq!(filter_query(&ConditionSet::new()), json!({"match_all": {}}));
    }

    #[test]
    fn test_geo_distance_sort() {
        let keys = parse_sort("-geodistance:43.6 1.44,id").unwrap();
        let clauses = sort_clauses(&keys, "position");
        assert_eq!(clauses[0]["_geo_distance"]["order"], "desc");
        assert_eq!(clauses[0]["_geo_distance"]["position"]["lat"], 43.6);
        assert_eq!(clauses[1], json!({"id": {"order": "asc"}}));
    }
}
