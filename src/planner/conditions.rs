//! Backend-neutral filter conditions
//!
//! Every filter expression is validated against the resolved field type and
//! compiled into a `Condition`. A `MultiValueFilter` becomes one OR-ed
//! `ConditionGroup`; groups are AND-ed. A group is compiled completely
//! before anything is handed to a backend compiler, so a malformed member
//! never leaves a partially applied filter behind.

use geo_types::Geometry;
use tracing::debug;

use super::dates::parse_date;
use super::range::{parse_ranges, Scalar, ValueRange};
use crate::errors::{ExploreError, ExploreResult};
use crate::geo::parse_shape;
use crate::model::{
    CollectionReference, FieldType, FieldTypeResolver, FilterExpression, MultiValueFilter,
    Operator,
};

/// Single-value comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gte,
    Gt,
    Lte,
    Lt,
}

impl Comparison {
    /// Key used by the search DSL `range` query
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Gte => "gte",
            Comparison::Gt => "gt",
            Comparison::Lte => "lte",
            Comparison::Lt => "lt",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gte => ">=",
            Comparison::Gt => ">",
            Comparison::Lte => "<=",
            Comparison::Lt => "<",
        }
    }
}

/// Spatial relations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialRelation {
    Within,
    Intersects,
}

impl SpatialRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpatialRelation::Within => "within",
            SpatialRelation::Intersects => "intersects",
        }
    }
}

/// A compiled predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals one of the values
    In { field: String, values: Vec<Scalar> },
    /// Field equals none of the values (missing fields match)
    NotIn { field: String, values: Vec<Scalar> },
    Compare {
        field: String,
        op: Comparison,
        value: Scalar,
        is_date: bool,
    },
    /// Substring match
    Like { field: String, pattern: String },
    /// Field falls in any of the ranges
    Ranges {
        field: String,
        ranges: Vec<ValueRange>,
        is_date: bool,
    },
    Spatial {
        field: String,
        relation: SpatialRelation,
        negated: bool,
        shape: Geometry<f64>,
    },
    /// Full-text search, optionally scoped to one field
    Text { field: Option<String>, text: String },
}

impl Condition {
    pub fn field(&self) -> Option<&str> {
        match self {
            Condition::In { field, .. }
            | Condition::NotIn { field, .. }
            | Condition::Compare { field, .. }
            | Condition::Like { field, .. }
            | Condition::Ranges { field, .. }
            | Condition::Spatial { field, .. } => Some(field),
            Condition::Text { field, .. } => field.as_deref(),
        }
    }
}

/// OR-ed conditions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionGroup(pub Vec<Condition>);

impl ConditionGroup {
    pub fn conditions(&self) -> &[Condition] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// AND-ed groups. Identical groups are kept once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionSet {
    groups: Vec<ConditionGroup>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group; returns false when it was already present or empty
    pub fn add(&mut self, group: ConditionGroup) -> bool {
        if group.is_empty() || self.groups.contains(&group) {
            debug!(conditions = group.0.len(), "skipping duplicate filter group");
            return false;
        }
        self.groups.push(group);
        true
    }

    pub fn groups(&self) -> &[ConditionGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Compiles filter expressions for one collection
pub struct ConditionBuilder<'a> {
    collection: &'a CollectionReference,
    resolver: &'a dyn FieldTypeResolver,
}

impl<'a> ConditionBuilder<'a> {
    pub fn new(collection: &'a CollectionReference, resolver: &'a dyn FieldTypeResolver) -> Self {
        Self {
            collection,
            resolver,
        }
    }

    /// Compiles an OR-group of expressions
    pub fn group(
        &self,
        filter: &MultiValueFilter<FilterExpression>,
        date_format: Option<&str>,
    ) -> ExploreResult<ConditionGroup> {
        filter
            .iter()
            .map(|expression| self.expression(expression, date_format))
            .collect::<ExploreResult<Vec<_>>>()
            .map(ConditionGroup)
    }

    /// Compiles an OR-group of `field:text` searches. A search without
    /// field is only accepted when `allow_unscoped` is set.
    pub fn text_group(
        &self,
        queries: &MultiValueFilter<String>,
        allow_unscoped: bool,
    ) -> ExploreResult<ConditionGroup> {
        queries
            .iter()
            .map(|q| self.text(q, allow_unscoped))
            .collect::<ExploreResult<Vec<_>>>()
            .map(ConditionGroup)
    }

    fn text(&self, query: &str, allow_unscoped: bool) -> ExploreResult<Condition> {
        match query.split_once(':') {
            Some((field, text)) if !field.trim().is_empty() => {
                let field = field.trim();
                if text.trim().is_empty() {
                    return Err(ExploreError::invalid_parameter(format!(
                        "Search text is missing in '{}'",
                        query
                    )));
                }
                let field_type = self.resolver.field_type(self.collection, field)?;
                if field_type.is_geometry() {
                    return Err(ExploreError::invalid_parameter(format!(
                        "Full-text search is not supported on geometry field '{}'",
                        field
                    ))
                    .with_field(field));
                }
                Ok(Condition::Text {
                    field: Some(field.to_string()),
                    text: text.trim().to_string(),
                })
            }
            _ => {
                let text = query.trim_start_matches(':').trim();
                if text.is_empty() {
                    return Err(ExploreError::invalid_parameter("Search text is missing"));
                }
                if !allow_unscoped {
                    return Err(ExploreError::not_allowed(format!(
                        "Full-text search without a field is not supported by this backend: '{}'",
                        query
                    )));
                }
                Ok(Condition::Text {
                    field: None,
                    text: text.to_string(),
                })
            }
        }
    }

    /// Compiles one expression
    pub fn expression(
        &self,
        expression: &FilterExpression,
        date_format: Option<&str>,
    ) -> ExploreResult<Condition> {
        expression.validate()?;
        let field = expression.field.trim();
        let field_type = self.resolver.field_type(self.collection, field)?;
        let value = expression.value.as_str();

        let unsupported = || {
            ExploreError::invalid_parameter(format!(
                "Operator '{}' is not supported on field '{}' of type '{}'",
                expression.op,
                field,
                field_type.as_str()
            ))
            .with_field(field)
        };

        if expression.op.is_spatial() != field_type.is_geometry() {
            return Err(unsupported());
        }

        // Dates are only parsed through the request format when one is given
        let date_format = if field_type.is_date() { date_format } else { None };

        let condition = match expression.op {
            Operator::Eq | Operator::Ne => {
                let values = split_values(value, field_type, field)?;
                if expression.op == Operator::Eq {
                    Condition::In {
                        field: field.to_string(),
                        values,
                    }
                } else {
                    Condition::NotIn {
                        field: field.to_string(),
                        values,
                    }
                }
            }
            Operator::Gte | Operator::Gt | Operator::Lte | Operator::Lt => {
                if !field_type.is_date() && !field_type.is_numeric() && !is_textual(field_type) {
                    return Err(unsupported());
                }
                let op = match expression.op {
                    Operator::Gte => Comparison::Gte,
                    Operator::Gt => Comparison::Gt,
                    Operator::Lte => Comparison::Lte,
                    _ => Comparison::Lt,
                };
                let value = match date_format {
                    Some(format) => Scalar::Integer(parse_date(value, format)?),
                    None => typed_value(value, field_type, field)?,
                };
                Condition::Compare {
                    field: field.to_string(),
                    op,
                    value,
                    is_date: field_type.is_date(),
                }
            }
            Operator::Like => {
                if !is_textual(field_type) {
                    return Err(unsupported());
                }
                Condition::Like {
                    field: field.to_string(),
                    pattern: value.to_string(),
                }
            }
            Operator::Range => {
                if !field_type.is_date() && !field_type.is_numeric() && !is_textual(field_type) {
                    return Err(unsupported());
                }
                let ranges = parse_ranges(value, date_format).map_err(|e| e.with_field(field))?;
                // without a format, date bounds are epoch milliseconds
                let numeric_bounds = field_type.is_numeric() || field_type.is_date();
                let textual = |r: &ValueRange| !r.min.is_number() || !r.max.is_number();
                if numeric_bounds && ranges.iter().any(textual) {
                    return Err(ExploreError::invalid_parameter(format!(
                        "Range '{}' on {} field '{}' must have numeric bounds",
                        value,
                        field_type.as_str(),
                        field
                    ))
                    .with_field(field));
                }
                Condition::Ranges {
                    field: field.to_string(),
                    ranges,
                    is_date: field_type.is_date(),
                }
            }
            Operator::Within | Operator::NotWithin | Operator::Intersects | Operator::NotIntersects => {
                let shape = parse_shape(value).map_err(|e| e.with_field(field))?;
                let (relation, negated) = match expression.op {
                    Operator::Within => (SpatialRelation::Within, false),
                    Operator::NotWithin => (SpatialRelation::Within, true),
                    Operator::Intersects => (SpatialRelation::Intersects, false),
                    _ => (SpatialRelation::Intersects, true),
                };
                Condition::Spatial {
                    field: field.to_string(),
                    relation,
                    negated,
                    shape,
                }
            }
        };
        Ok(condition)
    }
}

fn is_textual(field_type: FieldType) -> bool {
    matches!(field_type, FieldType::Text | FieldType::Keyword)
}

fn typed_value(raw: &str, field_type: FieldType, field: &str) -> ExploreResult<Scalar> {
    let raw = raw.trim();
    if field_type.is_numeric() || field_type.is_date() {
        let value = Scalar::parse(raw);
        if !value.is_number() {
            return Err(ExploreError::invalid_parameter(format!(
                "Value '{}' of field '{}' must be a number",
                raw, field
            ))
            .with_field(field));
        }
        return Ok(value);
    }
    if field_type == FieldType::Boolean {
        return match raw {
            "true" => Ok(Scalar::Boolean(true)),
            "false" => Ok(Scalar::Boolean(false)),
            _ => Err(ExploreError::invalid_parameter(format!(
                "Value '{}' of field '{}' must be true or false",
                raw, field
            ))
            .with_field(field)),
        };
    }
    Ok(Scalar::Text(raw.to_string()))
}

fn split_values(value: &str, field_type: FieldType, field: &str) -> ExploreResult<Vec<Scalar>> {
    let values = value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| typed_value(v, field_type, field))
        .collect::<ExploreResult<Vec<_>>>()?;
    if values.is_empty() {
        return Err(ExploreError::invalid_parameter(format!(
            "Value '{}' of field '{}' has no item",
            value, field
        ))
        .with_field(field));
    }
    Ok(values)
}
