//! Validated request inputs handed to the engine by the REST layer

use serde::{Deserialize, Serialize};

use super::aggregation::{AggregationSpec, ComputationMetric};
use super::filter::{FilterExpression, MultiValueFilter};
use super::page::Page;

/// Filters shared by every request kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    /// AND-combined OR-groups of expressions
    #[serde(default)]
    pub f: Vec<MultiValueFilter<FilterExpression>>,
    /// AND-combined OR-groups of `field:text` searches
    #[serde(default)]
    pub q: Vec<MultiValueFilter<String>>,
    /// Pattern of date values in `f`
    #[serde(default)]
    pub date_format: Option<String>,
}

impl FilterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an OR-group of expressions
    pub fn filter(mut self, group: Vec<FilterExpression>) -> Self {
        self.f.push(group.into());
        self
    }

    /// Adds an OR-group of text searches
    pub fn query(mut self, group: Vec<&str>) -> Self {
        self.q
            .push(group.into_iter().map(str::to_string).collect::<Vec<_>>().into());
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub filter: FilterRequest,
    #[serde(default)]
    pub page: Page,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    #[serde(flatten)]
    pub filter: FilterRequest,
    pub aggregations: Vec<AggregationSpec>,
    /// Results must be localized geographically
    #[serde(default)]
    pub geo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationRequest {
    #[serde(flatten)]
    pub filter: FilterRequest,
    pub field: String,
    pub metric: ComputationMetric,
}

/// Any request the engine compiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExploreRequest {
    Search(SearchRequest),
    Aggregate(AggregationRequest),
    Compute(ComputationRequest),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operator;

    #[test]
    fn test_tagged_request() {
        let json = r#"{
            "kind": "aggregate",
            "f": [[{"field": "status", "op": "eq", "value": "A,B"}]],
            "aggregations": [{"type": "term", "field": "status"}]
        }"#;
        let request: ExploreRequest = serde_json::from_str(json).unwrap();
        match request {
            ExploreRequest::Aggregate(agg) => {
                assert_eq!(agg.filter.f.len(), 1);
                assert_eq!(agg.filter.f[0].iter().next().unwrap().op, Operator::Eq);
                assert!(!agg.geo);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_search_request_defaults() {
        let request: ExploreRequest = serde_json::from_str(r#"{"kind": "search"}"#).unwrap();
        match request {
            ExploreRequest::Search(search) => {
                assert_eq!(search.page.size, 10);
                assert!(search.filter.q.is_empty());
            }
            other => panic!("unexpected request {:?}", other),
        }
    }
}
