//! Aggregation request structures
//!
//! One `AggregationSpec` per tree level; level `i` is the parent of
//! level `i + 1`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ExploreError, ExploreResult};

/// Aggregation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    DateHistogram,
    Histogram,
    Term,
    Geohash,
    Geotile,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::DateHistogram => "datehistogram",
            AggregationType::Histogram => "histogram",
            AggregationType::Term => "term",
            AggregationType::Geohash => "geohash",
            AggregationType::Geotile => "geotile",
        }
    }

    /// Returns true for geohash and geotile
    pub fn is_geo(&self) -> bool {
        matches!(self, AggregationType::Geohash | AggregationType::Geotile)
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric functions collected per bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectFunction {
    Avg,
    Cardinality,
    Max,
    Min,
    Sum,
    #[serde(rename = "geobbox")]
    GeoBBox,
    #[serde(rename = "geocentroid")]
    GeoCentroid,
}

impl CollectFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectFunction::Avg => "avg",
            CollectFunction::Cardinality => "cardinality",
            CollectFunction::Max => "max",
            CollectFunction::Min => "min",
            CollectFunction::Sum => "sum",
            CollectFunction::GeoBBox => "geobbox",
            CollectFunction::GeoCentroid => "geocentroid",
        }
    }

    /// Returns true for functions producing a geometry
    pub fn is_geo(&self) -> bool {
        matches!(self, CollectFunction::GeoBBox | CollectFunction::GeoCentroid)
    }
}

/// A metric request; both halves must be present
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default)]
    pub collect_field: Option<String>,
    #[serde(default)]
    pub collect_fct: Option<CollectFunction>,
}

impl Metric {
    pub fn new(collect_fct: CollectFunction, collect_field: impl Into<String>) -> Self {
        Self {
            collect_field: Some(collect_field.into()),
            collect_fct: Some(collect_fct),
        }
    }
}

/// Sort order of buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

/// What buckets are ordered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderOn {
    /// The bucket key
    Field,
    /// The document count
    Count,
    /// The first non-geo metric
    Result,
}

/// Geometries computed per bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregatedGeometry {
    /// Bounding box of the bucket's centroids
    Bbox,
    /// Centroid of the bucket's centroids
    Centroid,
    /// Polygon of the geohash/geotile cell
    Cell,
    /// Center point of the geohash/geotile cell
    CellCenter,
}

impl AggregatedGeometry {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregatedGeometry::Bbox => "bbox",
            AggregatedGeometry::Centroid => "centroid",
            AggregatedGeometry::Cell => "cell",
            AggregatedGeometry::CellCenter => "cell_center",
        }
    }

    /// Returns true for geometries derived from the bucket key alone
    pub fn is_cell(&self) -> bool {
        matches!(self, AggregatedGeometry::Cell | AggregatedGeometry::CellCenter)
    }
}

/// A geometry taken from a representative document of the bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGeometry {
    /// Geometry path
    pub geometry: String,
    /// Sort tokens selecting the representative document
    #[serde(default)]
    pub sort: Option<String>,
}

impl RawGeometry {
    pub fn new(geometry: impl Into<String>, sort: Option<&str>) -> Self {
        Self {
            geometry: geometry.into(),
            sort: sort.map(str::to_string),
        }
    }
}

/// Documents fetched per bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchHits {
    pub size: usize,
    /// Included paths; a `+`/`-` prefix also sorts on the path
    #[serde(default)]
    pub include: Vec<String>,
}

/// One aggregation level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    #[serde(rename = "type")]
    pub agg_type: AggregationType,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub order: Option<Order>,
    #[serde(default)]
    pub on: Option<OrderOn>,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub aggregated_geometries: Vec<AggregatedGeometry>,
    #[serde(default)]
    pub raw_geometries: Vec<RawGeometry>,
    #[serde(default)]
    pub fetch_hits: Option<FetchHits>,
}

impl AggregationSpec {
    pub fn new(agg_type: AggregationType) -> Self {
        Self {
            agg_type,
            field: None,
            interval: None,
            format: None,
            metrics: Vec::new(),
            order: None,
            on: None,
            size: None,
            include: None,
            aggregated_geometries: Vec::new(),
            raw_geometries: Vec::new(),
            fetch_hits: None,
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn metric(mut self, fct: CollectFunction, field: impl Into<String>) -> Self {
        self.metrics.push(Metric::new(fct, field));
        self
    }

    pub fn order(mut self, order: Order, on: OrderOn) -> Self {
        self.order = Some(order);
        self.on = Some(on);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn include(mut self, include: impl Into<String>) -> Self {
        self.include = Some(include.into());
        self
    }

    pub fn aggregated_geometry(mut self, geometry: AggregatedGeometry) -> Self {
        self.aggregated_geometries.push(geometry);
        self
    }

    pub fn raw_geometry(mut self, geometry: impl Into<String>, sort: Option<&str>) -> Self {
        self.raw_geometries.push(RawGeometry::new(geometry, sort));
        self
    }

    pub fn fetch_hits(mut self, size: usize, include: &[&str]) -> Self {
        self.fetch_hits = Some(FetchHits {
            size,
            include: include.iter().map(|s| s.to_string()).collect(),
        });
        self
    }
}

/// Calendar and fixed date units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl DateUnit {
    /// Parses a unit name. `M` is month, `m` is minute.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M" => return Some(DateUnit::Month),
            "m" => return Some(DateUnit::Minute),
            _ => {}
        }
        match s.to_ascii_lowercase().as_str() {
            "y" | "year" | "years" => Some(DateUnit::Year),
            "q" | "quarter" | "quarters" => Some(DateUnit::Quarter),
            "month" | "months" => Some(DateUnit::Month),
            "w" | "week" | "weeks" => Some(DateUnit::Week),
            "d" | "day" | "days" => Some(DateUnit::Day),
            "h" | "hour" | "hours" => Some(DateUnit::Hour),
            "minute" | "minutes" => Some(DateUnit::Minute),
            "s" | "second" | "seconds" => Some(DateUnit::Second),
            _ => None,
        }
    }

    /// Calendar units only accept a multiplier of 1
    pub fn is_calendar(&self) -> bool {
        matches!(
            self,
            DateUnit::Year | DateUnit::Quarter | DateUnit::Month | DateUnit::Week
        )
    }

    /// Backend interval suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            DateUnit::Year => "y",
            DateUnit::Quarter => "q",
            DateUnit::Month => "M",
            DateUnit::Week => "w",
            DateUnit::Day => "d",
            DateUnit::Hour => "h",
            DateUnit::Minute => "m",
            DateUnit::Second => "s",
        }
    }

    /// Length in milliseconds of a fixed unit
    pub fn fixed_millis(&self) -> Option<i64> {
        match self {
            DateUnit::Day => Some(86_400_000),
            DateUnit::Hour => Some(3_600_000),
            DateUnit::Minute => Some(60_000),
            DateUnit::Second => Some(1_000),
            _ => None,
        }
    }

    /// Unit name understood by `DATE_TRUNC`
    pub fn name(&self) -> &'static str {
        match self {
            DateUnit::Year => "year",
            DateUnit::Quarter => "quarter",
            DateUnit::Month => "month",
            DateUnit::Week => "week",
            DateUnit::Day => "day",
            DateUnit::Hour => "hour",
            DateUnit::Minute => "minute",
            DateUnit::Second => "second",
        }
    }
}

/// A parsed interval: a value with an optional date unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub value: f64,
    pub unit: Option<DateUnit>,
}

fn interval_regex() -> &'static Regex {
    static INTERVAL: OnceLock<Regex> = OnceLock::new();
    INTERVAL.get_or_init(|| {
        Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)?\s*([A-Za-z]*)\s*$").expect("valid interval regex")
    })
}

impl Interval {
    /// Parses `3`, `2.5`, `1month`, `3d`, `day`
    pub fn parse(raw: &str) -> ExploreResult<Self> {
        let invalid = || ExploreError::invalid_parameter(format!("Invalid interval '{}'", raw));
        let captures = interval_regex().captures(raw).ok_or_else(invalid)?;
        let number = captures.get(1).map(|m| m.as_str());
        let unit = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

        let unit = if unit.is_empty() {
            None
        } else {
            Some(DateUnit::parse(unit).ok_or_else(invalid)?)
        };
        let value = match number {
            Some(n) => n.parse::<f64>().map_err(|_| invalid())?,
            None if unit.is_some() => 1.0,
            None => return Err(invalid()),
        };
        if value <= 0.0 {
            return Err(invalid());
        }
        Ok(Self { value, unit })
    }

    /// Returns the value as a whole number, if it is one
    pub fn as_integer(&self) -> Option<u32> {
        if self.value.fract() == 0.0 && self.value <= u32::MAX as f64 {
            Some(self.value as u32)
        } else {
            None
        }
    }
}

/// Single-value computations over a filtered set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputationMetric {
    Avg,
    Cardinality,
    Max,
    Min,
    Sum,
    /// max - min
    Spanning,
    #[serde(rename = "geobbox")]
    GeoBBox,
    #[serde(rename = "geocentroid")]
    GeoCentroid,
}

impl ComputationMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputationMetric::Avg => "avg",
            ComputationMetric::Cardinality => "cardinality",
            ComputationMetric::Max => "max",
            ComputationMetric::Min => "min",
            ComputationMetric::Sum => "sum",
            ComputationMetric::Spanning => "spanning",
            ComputationMetric::GeoBBox => "geobbox",
            ComputationMetric::GeoCentroid => "geocentroid",
        }
    }

    pub fn is_geo(&self) -> bool {
        matches!(self, ComputationMetric::GeoBBox | ComputationMetric::GeoCentroid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parsing() {
        let i = Interval::parse("3day").unwrap();
        assert_eq!(i.value, 3.0);
        assert_eq!(i.unit, Some(DateUnit::Day));

        let i = Interval::parse("1M").unwrap();
        assert_eq!(i.unit, Some(DateUnit::Month));

        let i = Interval::parse("15m").unwrap();
        assert_eq!(i.unit, Some(DateUnit::Minute));
        assert_eq!(i.as_integer(), Some(15));

        let i = Interval::parse("week").unwrap();
        assert_eq!(i.value, 1.0);

        let i = Interval::parse("2.5").unwrap();
        assert_eq!(i.unit, None);
        assert_eq!(i.as_integer(), None);
    }

    #[test]
    fn test_interval_rejects_garbage() {
        assert!(Interval::parse("").is_err());
        assert!(Interval::parse("3 fortnights").is_err());
        assert!(Interval::parse("0").is_err());
        assert!(Interval::parse("-3d").is_err());
    }

    #[test]
    fn test_spec_deserialization() {
        let json = r#"{
            "type": "geohash",
            "interval": "5",
            "metrics": [{"collect_field": "speed", "collect_fct": "avg"}],
            "aggregated_geometries": ["cell", "cell_center"],
            "raw_geometries": [{"geometry": "track", "sort": "-timestamp"}]
        }"#;
        let spec: AggregationSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.agg_type, AggregationType::Geohash);
        assert_eq!(spec.metrics[0].collect_fct, Some(CollectFunction::Avg));
        assert_eq!(spec.aggregated_geometries[1], AggregatedGeometry::CellCenter);
        assert_eq!(spec.raw_geometries[0].sort.as_deref(), Some("-timestamp"));
        assert!(spec.fetch_hits.is_none());
    }

    #[test]
    fn test_calendar_units() {
        assert!(DateUnit::Quarter.is_calendar());
        assert!(!DateUnit::Hour.is_calendar());
        assert_eq!(DateUnit::Hour.fixed_millis(), Some(3_600_000));
        assert_eq!(DateUnit::Month.fixed_millis(), None);
    }
}
