//! Aggregation validation
//!
//! `AggregationPlan::compile` checks every aggregation level against the
//! collection's field types and turns it into an `AggregationLevel`: a
//! closed aggregation kind, a resolved field, bucket ordering, metrics and
//! geometry requests. Backend compilers and assemblers only ever see the
//! plan, never the raw specs, so the two backends share one set of rules.
//!
//! Level names are `{type}_{depth}`.

use regex::Regex;

use super::dates::{validate_format, DEFAULT_KEY_FORMAT};
use super::sorting::{parse_sort, SortKey};
use crate::errors::{ExploreError, ExploreResult};
use crate::geo::MAX_GEOHASH_PRECISION;
use crate::model::{
    AggregatedGeometry, AggregationSpec, AggregationType, CollectFunction, CollectionReference,
    ComputationMetric, DateUnit, FieldType, FieldTypeResolver, Interval, Order, OrderOn,
};

/// Highest geotile zoom level
pub const MAX_GEOTILE_PRECISION: u8 = 29;

/// Name of the fetch-hits sub-aggregation
pub const FETCHED_HITS: &str = "fetched_hits";

/// Aggregation kind with its backend-neutral interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationKind {
    DateHistogram { unit: DateUnit, multiplier: u32 },
    Histogram { interval: f64 },
    Term,
    Geohash { precision: u8 },
    Geotile { precision: u8 },
}

impl AggregationKind {
    pub fn agg_type(&self) -> AggregationType {
        match self {
            AggregationKind::DateHistogram { .. } => AggregationType::DateHistogram,
            AggregationKind::Histogram { .. } => AggregationType::Histogram,
            AggregationKind::Term => AggregationType::Term,
            AggregationKind::Geohash { .. } => AggregationType::Geohash,
            AggregationKind::Geotile { .. } => AggregationType::Geotile,
        }
    }

    pub fn is_geo(&self) -> bool {
        self.agg_type().is_geo()
    }
}

/// Ordering of the buckets of one level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOrder {
    Key(Order),
    Count(Order),
    /// On the named metric of the level
    Metric { name: String, order: Order },
}

/// Where the value of a metric comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSource {
    /// A sub-aggregation of its own
    Own,
    /// The aggregated geometry of the same kind, computed once
    AggregatedGeometry(AggregatedGeometry),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMetric {
    pub function: CollectFunction,
    pub field: String,
    /// `{fct}_{field}` with `.` replaced by `_`
    pub name: String,
    pub source: MetricSource,
}

/// Representative documents picked with one sort, for several paths
#[derive(Debug, Clone, PartialEq)]
pub struct RawGeometryGroup {
    pub name: String,
    pub sort: Option<String>,
    pub sort_keys: Vec<SortKey>,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    pub size: usize,
    pub include: Vec<String>,
    pub sort_keys: Vec<SortKey>,
}

/// One validated aggregation level
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationLevel {
    pub depth: usize,
    pub name: String,
    pub kind: AggregationKind,
    pub field: String,
    pub field_type: FieldType,
    /// None for geohash and geotile levels
    pub order: Option<BucketOrder>,
    pub size: Option<usize>,
    pub include: Option<String>,
    /// Display format of date histogram keys
    pub format: String,
    pub metrics: Vec<PlannedMetric>,
    pub aggregated_geometries: Vec<AggregatedGeometry>,
    pub raw_geometries: Vec<RawGeometryGroup>,
    pub fetch_hits: Option<FetchPlan>,
}

impl AggregationLevel {
    pub fn agg_type(&self) -> AggregationType {
        self.kind.agg_type()
    }

    /// Metrics backed by a sub-aggregation of their own
    pub fn own_metrics(&self) -> impl Iterator<Item = &PlannedMetric> {
        self.metrics
            .iter()
            .filter(|m| m.source == MetricSource::Own)
    }

    /// Aggregated geometries computed by a sub-aggregation (bbox, centroid)
    pub fn computed_geometries(&self) -> impl Iterator<Item = AggregatedGeometry> + '_ {
        self.aggregated_geometries
            .iter()
            .copied()
            .filter(|g| !g.is_cell())
    }
}

/// Name of the sub-aggregation computing an aggregated bbox or centroid
pub fn aggregated_geometry_name(geometry: AggregatedGeometry) -> String {
    format!("{}_aggregated_geometry", geometry.as_str())
}

/// Name of a metric sub-aggregation
pub fn metric_name(function: CollectFunction, field: &str) -> String {
    format!("{}_{}", function.as_str(), field.replace('.', "_"))
}

/// Validated aggregation tree, level 0 first
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    pub levels: Vec<AggregationLevel>,
    /// Results must be localized geographically
    pub geo: bool,
}

impl AggregationPlan {
    /// Validates `specs` and builds the plan
    pub fn compile(
        specs: &[AggregationSpec],
        collection: &CollectionReference,
        resolver: &dyn FieldTypeResolver,
        geo: bool,
    ) -> ExploreResult<Self> {
        if specs.is_empty() {
            return Err(ExploreError::bad_request("At least one aggregation is required"));
        }

        let planner = LevelPlanner {
            collection,
            resolver,
        };
        let levels = specs
            .iter()
            .enumerate()
            .map(|(depth, spec)| {
                planner
                    .level(depth, spec)
                    .map_err(|e| e.with_context(format!("aggregation {}", depth)))
            })
            .collect::<ExploreResult<Vec<_>>>()?;

        if geo {
            let first = &levels[0];
            if !first.kind.is_geo()
                && first.raw_geometries.is_empty()
                && first.aggregated_geometries.is_empty()
            {
                return Err(ExploreError::not_allowed(format!(
                    "A geo aggregation must start with a geohash or geotile aggregation, \
                     or request raw or aggregated geometries on '{}'",
                    first.name
                )));
            }
        }

        Ok(Self { levels, geo })
    }

    pub fn level(&self, depth: usize) -> Option<&AggregationLevel> {
        self.levels.get(depth)
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Checks that `field` can carry `metric` and returns its type
pub fn check_computation(
    collection: &CollectionReference,
    resolver: &dyn FieldTypeResolver,
    field: &str,
    metric: ComputationMetric,
) -> ExploreResult<FieldType> {
    let field = field.trim();
    if field.is_empty() {
        return Err(ExploreError::bad_request("'field' is required for a computation"));
    }
    let field_type = resolver.field_type(collection, field)?;
    let suitable = match metric {
        ComputationMetric::GeoBBox | ComputationMetric::GeoCentroid => field_type.is_point(),
        ComputationMetric::Cardinality => !field_type.is_geometry(),
        _ => field_type.is_numeric() || field_type.is_date(),
    };
    if !suitable {
        return Err(ExploreError::invalid_parameter(format!(
            "{} cannot be computed on field '{}' of type {}",
            metric.as_str(),
            field,
            field_type.as_str()
        ))
        .with_field(field));
    }
    Ok(field_type)
}

struct LevelPlanner<'a> {
    collection: &'a CollectionReference,
    resolver: &'a dyn FieldTypeResolver,
}

impl LevelPlanner<'_> {
    fn field_type(&self, path: &str) -> ExploreResult<FieldType> {
        self.resolver.field_type(self.collection, path)
    }

    fn level(&self, depth: usize, spec: &AggregationSpec) -> ExploreResult<AggregationLevel> {
        let agg_type = spec.agg_type;

        if spec.format.is_some() && agg_type != AggregationType::DateHistogram {
            return Err(ExploreError::invalid_parameter(format!(
                "'format' is only supported by datehistogram aggregations, not {}",
                agg_type
            )));
        }

        let field = match (&spec.field, agg_type) {
            (Some(field), _) if !field.trim().is_empty() => field.trim().to_string(),
            (_, AggregationType::DateHistogram) => self.collection.timestamp_path.clone(),
            (_, AggregationType::Geohash | AggregationType::Geotile) => {
                self.collection.centroid_path.clone()
            }
            _ => {
                return Err(ExploreError::bad_request(format!(
                    "'field' is required for {} aggregations",
                    agg_type
                )))
            }
        };
        let field_type = self.field_type(&field)?;
        check_field_type(agg_type, &field, field_type)?;

        let kind = self.kind(agg_type, spec.interval.as_deref())?;
        let metrics = self.metrics(spec)?;
        let order = order(spec, &metrics)?;

        if spec.size.is_some()
            && matches!(
                agg_type,
                AggregationType::DateHistogram | AggregationType::Histogram
            )
        {
            return Err(ExploreError::invalid_parameter(format!(
                "'size' is not supported by {} aggregations",
                agg_type
            )));
        }
        if spec.size == Some(0) {
            return Err(ExploreError::invalid_parameter("'size' must be positive"));
        }

        if let Some(include) = &spec.include {
            if agg_type != AggregationType::Term {
                return Err(ExploreError::invalid_parameter(format!(
                    "'include' is only supported by term aggregations, not {}",
                    agg_type
                )));
            }
            Regex::new(include).map_err(|e| {
                ExploreError::invalid_parameter(format!("Invalid 'include' pattern: {}", e))
            })?;
        }

        let format = match &spec.format {
            Some(format) => {
                validate_format(format)?;
                format.clone()
            }
            None => DEFAULT_KEY_FORMAT.to_string(),
        };

        let mut aggregated_geometries = Vec::new();
        for geometry in &spec.aggregated_geometries {
            if geometry.is_cell() && !agg_type.is_geo() {
                return Err(ExploreError::invalid_parameter(format!(
                    "Aggregated geometry '{}' is only supported by geohash and geotile aggregations",
                    geometry.as_str()
                )));
            }
            if !aggregated_geometries.contains(geometry) {
                aggregated_geometries.push(*geometry);
            }
        }

        let metrics = metrics
            .into_iter()
            .map(|mut metric| {
                if let Some(geometry) = geometry_for(metric.function) {
                    if metric.field == self.collection.centroid_path
                        && aggregated_geometries.contains(&geometry)
                    {
                        metric.source = MetricSource::AggregatedGeometry(geometry);
                    }
                }
                metric
            })
            .collect();

        Ok(AggregationLevel {
            depth,
            name: format!("{}_{}", agg_type.as_str(), depth),
            kind,
            field,
            field_type,
            order,
            size: spec.size,
            include: spec.include.clone(),
            format,
            metrics,
            aggregated_geometries,
            raw_geometries: self.raw_geometries(spec)?,
            fetch_hits: fetch_plan(spec)?,
        })
    }

    fn kind(&self, agg_type: AggregationType, interval: Option<&str>) -> ExploreResult<AggregationKind> {
        let interval = match (interval, agg_type) {
            (Some(_), AggregationType::Term) => {
                return Err(ExploreError::invalid_parameter(
                    "'interval' is not supported by term aggregations",
                ))
            }
            (None, AggregationType::Term) => return Ok(AggregationKind::Term),
            (Some(interval), _) if !interval.trim().is_empty() => interval.trim(),
            _ => {
                return Err(ExploreError::bad_request(format!(
                    "'interval' is required for {} aggregations",
                    agg_type
                )))
            }
        };

        match agg_type {
            AggregationType::DateHistogram => {
                let parsed = Interval::parse(interval)?;
                let unit = parsed.unit.ok_or_else(|| {
                    ExploreError::invalid_parameter(format!(
                        "Date interval '{}' must have a unit",
                        interval
                    ))
                })?;
                let multiplier = parsed.as_integer().ok_or_else(|| {
                    ExploreError::invalid_parameter(format!(
                        "Date interval '{}' must be a whole number of units",
                        interval
                    ))
                })?;
                if unit.is_calendar() && multiplier != 1 {
                    return Err(ExploreError::invalid_parameter(format!(
                        "The {} unit only supports an interval of 1, got '{}'",
                        unit.name(),
                        interval
                    )));
                }
                Ok(AggregationKind::DateHistogram { unit, multiplier })
            }
            AggregationType::Histogram => {
                let parsed = Interval::parse(interval)?;
                if parsed.unit.is_some() {
                    return Err(ExploreError::invalid_parameter(format!(
                        "Histogram interval '{}' must be a number",
                        interval
                    )));
                }
                Ok(AggregationKind::Histogram {
                    interval: parsed.value,
                })
            }
            AggregationType::Geohash => {
                let precision = parse_precision(interval, 1, MAX_GEOHASH_PRECISION as u8)?;
                Ok(AggregationKind::Geohash { precision })
            }
            AggregationType::Geotile => {
                let precision = parse_precision(interval, 0, MAX_GEOTILE_PRECISION)?;
                Ok(AggregationKind::Geotile { precision })
            }
            AggregationType::Term => Ok(AggregationKind::Term),
        }
    }

    fn metrics(&self, spec: &AggregationSpec) -> ExploreResult<Vec<PlannedMetric>> {
        let mut planned: Vec<PlannedMetric> = Vec::new();
        for metric in &spec.metrics {
            let (function, field) = match (metric.collect_fct, &metric.collect_field) {
                (Some(function), Some(field)) if !field.trim().is_empty() => {
                    (function, field.trim().to_string())
                }
                (Some(_), _) => {
                    return Err(ExploreError::bad_request("collect field not specified"))
                }
                (None, Some(_)) => {
                    return Err(ExploreError::bad_request("collect function not specified"))
                }
                (None, None) => continue,
            };

            let field_type = self.field_type(&field)?;
            match function {
                CollectFunction::GeoBBox | CollectFunction::GeoCentroid => {
                    if !field_type.is_point() {
                        return Err(ExploreError::invalid_parameter(format!(
                            "{} requires a point field, '{}' is {}",
                            function.as_str(),
                            field,
                            field_type.as_str()
                        ))
                        .with_field(&field));
                    }
                }
                CollectFunction::Avg
                | CollectFunction::Max
                | CollectFunction::Min
                | CollectFunction::Sum => {
                    if !field_type.is_numeric() && !field_type.is_date() {
                        return Err(ExploreError::invalid_parameter(format!(
                            "{} requires a numeric or date field, '{}' is {}",
                            function.as_str(),
                            field,
                            field_type.as_str()
                        ))
                        .with_field(&field));
                    }
                }
                CollectFunction::Cardinality => {
                    if field_type.is_geometry() {
                        return Err(ExploreError::invalid_parameter(format!(
                            "cardinality is not supported on geometry field '{}'",
                            field
                        ))
                        .with_field(&field));
                    }
                }
            }

            let name = metric_name(function, &field);
            if planned.iter().any(|m| m.name == name) {
                continue;
            }
            planned.push(PlannedMetric {
                function,
                field,
                name,
                source: MetricSource::Own,
            });
        }
        Ok(planned)
    }

    fn raw_geometries(&self, spec: &AggregationSpec) -> ExploreResult<Vec<RawGeometryGroup>> {
        let mut groups: Vec<RawGeometryGroup> = Vec::new();
        for raw in &spec.raw_geometries {
            let path = raw.geometry.trim();
            if !self.field_type(path)?.is_geometry() {
                return Err(ExploreError::invalid_parameter(format!(
                    "Raw geometry '{}' is not a geometry field",
                    path
                ))
                .with_field(path));
            }
            let sort = raw
                .sort
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            match groups.iter_mut().find(|g| g.sort == sort) {
                Some(group) => {
                    if !group.paths.iter().any(|p| p == path) {
                        group.paths.push(path.to_string());
                    }
                }
                None => {
                    let sort_keys = match &sort {
                        Some(s) => parse_sort(s)?,
                        None => Vec::new(),
                    };
                    groups.push(RawGeometryGroup {
                        name: format!("raw_geometries_{}", groups.len()),
                        sort,
                        sort_keys,
                        paths: vec![path.to_string()],
                    });
                }
            }
        }
        Ok(groups)
    }
}

fn check_field_type(agg_type: AggregationType, field: &str, field_type: FieldType) -> ExploreResult<()> {
    let suitable = match agg_type {
        AggregationType::DateHistogram => field_type.is_date(),
        AggregationType::Histogram => field_type.is_numeric() || field_type.is_date(),
        AggregationType::Term => !field_type.is_geometry() && field_type != FieldType::Object,
        AggregationType::Geohash | AggregationType::Geotile => field_type.is_point(),
    };
    if suitable {
        Ok(())
    } else {
        Err(ExploreError::invalid_parameter(format!(
            "Field '{}' of type {} cannot be used by a {} aggregation",
            field,
            field_type.as_str(),
            agg_type
        ))
        .with_field(field))
    }
}

fn parse_precision(interval: &str, min: u8, max: u8) -> ExploreResult<u8> {
    interval
        .parse::<u8>()
        .ok()
        .filter(|p| (min..=max).contains(p))
        .ok_or_else(|| {
            ExploreError::invalid_parameter(format!(
                "Precision '{}' must be an integer between {} and {}",
                interval, min, max
            ))
        })
}

fn order(spec: &AggregationSpec, metrics: &[PlannedMetric]) -> ExploreResult<Option<BucketOrder>> {
    if spec.agg_type.is_geo() {
        if spec.order.is_some() || spec.on.is_some() {
            return Err(ExploreError::not_allowed(format!(
                "Ordering is not allowed on {} aggregations",
                spec.agg_type
            )));
        }
        return Ok(None);
    }

    let order = match (spec.order, spec.on) {
        (None, None) => match spec.agg_type {
            AggregationType::Term => BucketOrder::Count(Order::Desc),
            _ => BucketOrder::Key(Order::Asc),
        },
        (Some(order), Some(OrderOn::Field)) => BucketOrder::Key(order),
        (Some(order), Some(OrderOn::Count)) => BucketOrder::Count(order),
        (Some(order), Some(OrderOn::Result)) => {
            let metric = metrics.iter().find(|m| !m.function.is_geo()).ok_or_else(|| {
                ExploreError::not_allowed(
                    "Ordering on 'result' requires a metric other than geobbox or geocentroid",
                )
            })?;
            BucketOrder::Metric {
                name: metric.name.clone(),
                order,
            }
        }
        (Some(_), None) => {
            return Err(ExploreError::bad_request("'order' requires 'on' to be specified"))
        }
        (None, Some(_)) => {
            return Err(ExploreError::bad_request("'on' requires 'order' to be specified"))
        }
    };
    Ok(Some(order))
}

fn geometry_for(function: CollectFunction) -> Option<AggregatedGeometry> {
    match function {
        CollectFunction::GeoBBox => Some(AggregatedGeometry::Bbox),
        CollectFunction::GeoCentroid => Some(AggregatedGeometry::Centroid),
        _ => None,
    }
}

fn fetch_plan(spec: &AggregationSpec) -> ExploreResult<Option<FetchPlan>> {
    let fetch = match &spec.fetch_hits {
        Some(fetch) => fetch,
        None => return Ok(None),
    };
    if fetch.size == 0 {
        return Err(ExploreError::invalid_parameter("'fetch_hits' size must be positive"));
    }

    let mut include = Vec::new();
    let mut sort_keys = Vec::new();
    for raw in &fetch.include {
        let raw = raw.trim();
        let (path, direction) = match raw.chars().next() {
            Some('+') => (&raw[1..], Some(Order::Asc)),
            Some('-') => (&raw[1..], Some(Order::Desc)),
            _ => (raw, None),
        };
        if path.is_empty() {
            return Err(ExploreError::invalid_parameter(format!(
                "Invalid 'fetch_hits' include '{}'",
                raw
            )));
        }
        if let Some(direction) = direction {
            sort_keys.push(SortKey::Field {
                field: path.to_string(),
                direction,
            });
        }
        include.push(path.to_string());
    }

    Ok(Some(FetchPlan {
        size: fetch.size,
        include,
        sort_keys,
    }))
}
