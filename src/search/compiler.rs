//! Search DSL compiler

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::aggregations::{aggregations, computation};
use super::filters::{filter_query, sort_clauses};
use crate::errors::ExploreResult;
use crate::model::ComputationMetric;
use crate::planner::{
    check_computation, parse_cursor, parse_sort, AggregationPlan, Capabilities, CompilerContext,
    ConditionGroup, ConditionSet, QueryCompiler,
};

/// A request against one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub index: String,
    pub body: Value,
}

/// Accumulates a search request
pub struct SearchCompiler {
    context: CompilerContext,
    filters: ConditionSet,
    size: Option<usize>,
    from: Option<usize>,
    sort: Vec<Value>,
    search_after: Option<Vec<Value>>,
    aggs: Option<Value>,
}

impl SearchCompiler {
    pub fn new(context: CompilerContext) -> Self {
        Self {
            context,
            filters: ConditionSet::new(),
            size: None,
            from: None,
            sort: Vec::new(),
            search_after: None,
            aggs: None,
        }
    }
}

impl QueryCompiler for SearchCompiler {
    type Plan = SearchPlan;

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            raw_geometries: true,
            fetch_hits: true,
            unscoped_full_text: true,
            tracks_other_doc_count: true,
        }
    }

    fn context(&self) -> &CompilerContext {
        &self.context
    }

    fn push_group(&mut self, group: ConditionGroup) {
        self.filters.add(group);
    }

    fn filter_size(&mut self, size: usize, from: usize) {
        self.size = Some(size);
        self.from = Some(from);
    }

    fn sort(&mut self, sort: &str) -> ExploreResult<()> {
        let keys = parse_sort(sort)?;
        self.sort = sort_clauses(&keys, &self.context.collection.centroid_path);
        Ok(())
    }

    fn search_after(&mut self, sort: &str, cursor: &str) -> ExploreResult<()> {
        let keys = parse_sort(sort)?;
        let values = parse_cursor(&keys, cursor, &self.context.collection.id_path)?;
        self.search_after = Some(values.iter().map(|v| v.to_json()).collect());
        Ok(())
    }

    fn aggregate(&mut self, plan: &AggregationPlan) -> ExploreResult<()> {
        self.aggs = Some(aggregations(plan, &self.context.collection));
        self.size = Some(0);
        self.from = None;
        Ok(())
    }

    fn compute(&mut self, field: &str, metric: ComputationMetric) -> ExploreResult<()> {
        check_computation(
            &self.context.collection,
            self.context.resolver.as_ref(),
            field,
            metric,
        )?;
        self.aggs = Some(computation(field.trim(), metric));
        self.size = Some(0);
        self.from = None;
        Ok(())
    }

    fn build(self) -> ExploreResult<SearchPlan> {
        let mut body = Map::new();
        body.insert("query".to_string(), filter_query(&self.filters));
        body.insert("track_total_hits".to_string(), json!(true));
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if let Some(from) = self.from.filter(|f| *f > 0) {
            body.insert("from".to_string(), json!(from));
        }
        if !self.sort.is_empty() {
            body.insert("sort".to_string(), Value::Array(self.sort));
        }
        if let Some(after) = self.search_after {
            body.insert("search_after".to_string(), Value::Array(after));
        }
        if let Some(aggs) = self.aggs {
            body.insert("aggs".to_string(), aggs);
        }

        let plan = SearchPlan {
            index: self.context.collection.index_name.clone(),
            body: Value::Object(body),
        };
        debug!(index = %plan.index, "compiled search plan");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::errors::ExploreErrorCode;
    use crate::model::{
        CollectionReference, FieldType, FilterExpression, MultiValueFilter, Operator,
        StaticFieldTypes,
    };

    fn compiler() -> SearchCompiler {
        let collection =
            CollectionReference::new("flights", "flights_v1", "id", "track", "position", "timestamp");
        let types = StaticFieldTypes::new()
            .with_field("id", FieldType::Keyword)
            .with_field("status", FieldType::Keyword)
            .with_field("speed", FieldType::Double)
            .with_field("timestamp", FieldType::Date)
            .with_field("position", FieldType::GeoPoint);
        SearchCompiler::new(CompilerContext::new(Arc::new(collection), Arc::new(types)))
    }

    fn status_filter() -> MultiValueFilter<FilterExpression> {
        MultiValueFilter::new(vec![FilterExpression::new("status", Operator::Eq, "A,B")])
    }

    #[test]
    fn test_plan_targets_index() {
        let mut compiler = compiler();
        compiler.filter(&status_filter(), None).unwrap();
        compiler.filter_size(20, 40);
        let plan = compiler.build().unwrap();
        assert_eq!(plan.index, "flights_v1");
        assert_eq!(plan.body["size"], 20);
        assert_eq!(plan.body["from"], 40);
        assert_eq!(
            plan.body["query"]["bool"]["filter"],
            json!([{"terms": {"status": ["A", "B"]}}])
        );
    }

    #[test]
    fn test_duplicate_groups_applied_once() {
        let mut compiler = compiler();
        compiler.filter(&status_filter(), None).unwrap();
        compiler.filter(&status_filter(), None).unwrap();
        let plan = compiler.build().unwrap();
        assert_eq!(plan.body["query"]["bool"]["filter"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_search_after() {
        let mut compiler = compiler();
        compiler.sort("-speed,id").unwrap();
        compiler.search_after("-speed,id", "120.5,abc").unwrap();
        let plan = compiler.build().unwrap();
        assert_eq!(plan.body["sort"], json!([{"speed": {"order": "desc"}}, {"id": {"order": "asc"}}]));
        assert_eq!(plan.body["search_after"], json!([120.5, "abc"]));
    }

    #[test]
    fn test_search_after_needs_id() {
        let mut compiler = compiler();
        let err = compiler.search_after("-speed", "120.5").unwrap_err();
        assert_eq!(err.code(), ExploreErrorCode::InvalidParameter);
    }

    #[test]
    fn test_compute() {
        let mut compiler = compiler();
        compiler.compute("speed", ComputationMetric::Avg).unwrap();
        let plan = compiler.build().unwrap();
        assert_eq!(plan.body["size"], 0);
        assert_eq!(plan.body["aggs"]["computation"], json!({"avg": {"field": "speed"}}));

        let mut compiler = self::compiler();
        assert!(compiler.compute("status", ComputationMetric::Sum).is_err());
    }

    #[test]
    fn test_unscoped_text_supported() {
        let mut compiler = compiler();
        compiler
            .filter_q(&MultiValueFilter::new(vec!["late".to_string()]))
            .unwrap();
        let plan = compiler.build().unwrap();
        assert_eq!(
            plan.body["query"]["bool"]["filter"][0]["query_string"]["query"],
            "late"
        );
    }
}
