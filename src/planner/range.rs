//! Scalar values and range filters
//!
//! A range value is a comma-separated list of `[min<max]` items. The left
//! bracket is `[` for an inclusive and `]` for an exclusive lower bound;
//! the right bracket is `]` for an inclusive and `[` for an exclusive upper
//! bound.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::dates::parse_date;
use crate::errors::{ExploreError, ExploreResult};

/// A typed filter, cursor or bound value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl Scalar {
    /// Types a raw value: integer, then float, else text
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>() {
            return Scalar::Integer(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Scalar::Float(f),
            _ => Scalar::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        self.as_f64().is_some()
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Integer(i) => json!(i),
            Scalar::Float(f) => json!(f),
            Scalar::Boolean(b) => json!(b),
            Scalar::Text(s) => json!(s),
        }
    }

    /// Numbers compare numerically, text lexicographically. Mixed kinds
    /// do not compare.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            (None, None) => match (self, other) {
                (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
                (Scalar::Boolean(a), Scalar::Boolean(b)) => Some(a.cmp(b)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// One interval of a range filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: Scalar,
    pub max: Scalar,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

fn range_regex() -> &'static Regex {
    static RANGE: OnceLock<Regex> = OnceLock::new();
    RANGE.get_or_init(|| {
        Regex::new(r"^([\[\]])([^<]+)<([^<]+)([\[\]])$").expect("valid range regex")
    })
}

/// Parses a comma-separated list of ranges.
///
/// When `date_format` is given, bounds are parsed through it into epoch
/// milliseconds.
pub fn parse_ranges(value: &str, date_format: Option<&str>) -> ExploreResult<Vec<ValueRange>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_range(item, date_format))
        .collect::<ExploreResult<Vec<_>>>()
        .and_then(|ranges| {
            if ranges.is_empty() {
                Err(ExploreError::invalid_parameter(format!(
                    "Invalid range '{}': no interval given",
                    value
                )))
            } else {
                Ok(ranges)
            }
        })
}

fn parse_range(item: &str, date_format: Option<&str>) -> ExploreResult<ValueRange> {
    let captures = range_regex().captures(item).ok_or_else(|| {
        ExploreError::invalid_parameter(format!(
            "Invalid range '{}': expected [min<max], ]min<max[, [min<max[ or ]min<max]",
            item
        ))
    })?;

    let bound = |raw: &str| -> ExploreResult<Scalar> {
        match date_format {
            Some(format) => parse_date(raw, format).map(Scalar::Integer),
            None => Ok(Scalar::parse(raw)),
        }
    };

    let range = ValueRange {
        min_inclusive: &captures[1] == "[",
        min: bound(&captures[2])?,
        max: bound(&captures[3])?,
        max_inclusive: &captures[4] == "]",
    };
    check_range_validity(&range)?;
    Ok(range)
}

/// Requires `min < max` between comparable bounds
pub fn check_range_validity(range: &ValueRange) -> ExploreResult<()> {
    match range.min.compare(&range.max) {
        Some(Ordering::Less) => Ok(()),
        Some(_) => Err(ExploreError::invalid_parameter(format!(
            "Invalid range: min '{}' must be lower than max '{}'",
            range.min, range.max
        ))),
        None => Err(ExploreError::invalid_parameter(format!(
            "Invalid range: bounds '{}' and '{}' are not of the same kind",
            range.min, range.max
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_typing() {
        assert_eq!(Scalar::parse("12"), Scalar::Integer(12));
        assert_eq!(Scalar::parse("-1.5"), Scalar::Float(-1.5));
        assert_eq!(Scalar::parse("abc"), Scalar::Text("abc".to_string()));
        assert_eq!(Scalar::parse("NaN"), Scalar::Text("NaN".to_string()));
    }

    #[test]
    fn test_bracket_flags() {
        let cases = [
            ("[1<2]", true, true),
            ("]1<2[", false, false),
            ("[1<2[", true, false),
            ("]1<2]", false, true),
        ];
        for (raw, min_inclusive, max_inclusive) in cases {
            let ranges = parse_ranges(raw, None).unwrap();
            assert_eq!(ranges.len(), 1);
            assert_eq!(ranges[0].min_inclusive, min_inclusive, "{}", raw);
            assert_eq!(ranges[0].max_inclusive, max_inclusive, "{}", raw);
        }
    }

    #[test]
    fn test_several_ranges() {
        let ranges = parse_ranges("[0<10[, [20<30]", None).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].min, Scalar::Integer(20));
    }

    #[test]
    fn test_min_must_be_lower() {
        assert!(parse_ranges("[5<5]", None).is_err());
        assert!(parse_ranges("[10<2]", None).is_err());
        // numeric, not lexicographic
        assert!(parse_ranges("[9<10]", None).is_ok());
        assert!(parse_ranges("[a<b]", None).is_ok());
        assert!(parse_ranges("[b<a]", None).is_err());
    }

    #[test]
    fn test_mixed_bounds_rejected() {
        let err = parse_ranges("[1<b]", None).unwrap_err();
        assert!(err.message().contains("same kind"));
    }

    #[test]
    fn test_malformed_ranges() {
        assert!(parse_ranges("1<2", None).is_err());
        assert!(parse_ranges("[1,2]", None).is_err());
        assert!(parse_ranges("(1<2)", None).is_err());
        assert!(parse_ranges("", None).is_err());
    }

    #[test]
    fn test_date_bounds() {
        let ranges = parse_ranges("[2020-01-01<2020-01-02]", Some("yyyy-MM-dd")).unwrap();
        assert_eq!(ranges[0].min, Scalar::Integer(1_577_836_800_000));
        assert_eq!(ranges[0].max, Scalar::Integer(1_577_923_200_000));
        assert!(parse_ranges("[2020-01-02<2020-01-01]", Some("yyyy-MM-dd")).is_err());
    }
}
