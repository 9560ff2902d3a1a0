//! # Filter Expressions
//!
//! `field:op:value` expressions and the OR-groups they travel in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ExploreError, ExploreResult};

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// One of the comma-separated values
    Eq,
    /// None of the comma-separated values
    Ne,
    Gte,
    Gt,
    Lte,
    Lt,
    /// Substring match
    Like,
    /// One of the comma-separated `[min<max]` ranges
    Range,
    Within,
    NotWithin,
    Intersects,
    NotIntersects,
}

impl Operator {
    /// Get the operator string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gte => "gte",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Lt => "lt",
            Operator::Like => "like",
            Operator::Range => "range",
            Operator::Within => "within",
            Operator::NotWithin => "notwithin",
            Operator::Intersects => "intersects",
            Operator::NotIntersects => "notintersects",
        }
    }

    /// Parses an operator name
    pub fn parse(s: &str) -> ExploreResult<Self> {
        match s {
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "gte" => Ok(Operator::Gte),
            "gt" => Ok(Operator::Gt),
            "lte" => Ok(Operator::Lte),
            "lt" => Ok(Operator::Lt),
            "like" => Ok(Operator::Like),
            "range" => Ok(Operator::Range),
            "within" => Ok(Operator::Within),
            "notwithin" => Ok(Operator::NotWithin),
            "intersects" => Ok(Operator::Intersects),
            "notintersects" => Ok(Operator::NotIntersects),
            other => Err(ExploreError::invalid_parameter(format!(
                "Operator '{}' is not supported",
                other
            ))),
        }
    }

    /// Returns true for spatial operators
    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            Operator::Within | Operator::NotWithin | Operator::Intersects | Operator::NotIntersects
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpression {
    /// Field path to filter on
    pub field: String,
    /// Comparison operator
    pub op: Operator,
    /// Raw value, interpreted per operator
    pub value: String,
}

impl FilterExpression {
    /// Create a new filter expression
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Parses `field:op:value`. The value keeps any further `:`.
    pub fn parse(expression: &str) -> ExploreResult<Self> {
        let mut parts = expression.splitn(3, ':');
        let field = parts.next().unwrap_or_default();
        let op = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();

        if field.is_empty() || op.is_empty() || value.is_empty() {
            return Err(ExploreError::invalid_parameter(format!(
                "Invalid filter expression '{}': expected field:op:value",
                expression
            )));
        }

        Ok(Self::new(field, Operator::parse(op)?, value))
    }

    /// Checks that no part of the expression is blank
    pub fn validate(&self) -> ExploreResult<()> {
        if self.field.trim().is_empty() {
            return Err(ExploreError::invalid_parameter("Filter field is missing"));
        }
        if self.value.trim().is_empty() {
            return Err(ExploreError::invalid_parameter(format!(
                "Filter value is missing for field '{}'",
                self.field
            ))
            .with_field(&self.field));
        }
        Ok(())
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.field, self.op, self.value)
    }
}

/// Members are OR-combined; several filters supplied together are AND-combined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiValueFilter<T>(Vec<T>);

impl<T> MultiValueFilter<T> {
    pub fn new(members: Vec<T>) -> Self {
        Self(members)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> From<Vec<T>> for MultiValueFilter<T> {
    fn from(members: Vec<T>) -> Self {
        Self(members)
    }
}

impl<T> Default for MultiValueFilter<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<'a, T> IntoIterator for &'a MultiValueFilter<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExploreErrorCode;

    #[test]
    fn test_parse_expression() {
        let expr = FilterExpression::parse("status:eq:A,B").unwrap();
        assert_eq!(expr.field, "status");
        assert_eq!(expr.op, Operator::Eq);
        assert_eq!(expr.value, "A,B");
    }

    #[test]
    fn test_parse_keeps_colons_in_value() {
        let expr = FilterExpression::parse("start:gte:2020-01-01T10:00:00").unwrap();
        assert_eq!(expr.op, Operator::Gte);
        assert_eq!(expr.value, "2020-01-01T10:00:00");
    }

    #[test]
    fn test_parse_rejects_incomplete() {
        let err = FilterExpression::parse("status:eq").unwrap_err();
        assert_eq!(err.code(), ExploreErrorCode::InvalidParameter);

        let err = FilterExpression::parse("status:contains:x").unwrap_err();
        assert!(err.message().contains("contains"));
    }

    #[test]
    fn test_operator_serde() {
        let op: Operator = serde_json::from_str("\"notintersects\"").unwrap();
        assert_eq!(op, Operator::NotIntersects);
        assert!(op.is_spatial());
        assert!(!Operator::Range.is_spatial());
    }

    #[test]
    fn test_multi_value_filter_serde_is_a_list() {
        let filter: MultiValueFilter<FilterExpression> = serde_json::from_str(
            r#"[{"field": "a", "op": "eq", "value": "1"}, {"field": "b", "op": "lt", "value": "3"}]"#,
        )
        .unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.iter().nth(1).unwrap().op, Operator::Lt);
    }
}
