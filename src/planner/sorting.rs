//! Sort specifications and pagination cursors
//!
//! A sort specification is a comma-separated list of tokens:
//!
//! - `field` / `-field`: ascending / descending on a field
//! - `geodistance:LAT LON` / `-geodistance:LAT LON`: distance from a point
//! - `LAT LON`: ascending distance (a leading `-` belongs to the latitude)
//!
//! Cursors (`after` / `before`) carry one value per sort key, in order.

use std::fmt;

use super::range::Scalar;
use crate::errors::{ExploreError, ExploreResult};
use crate::model::Order;

const GEO_DISTANCE_PREFIX: &str = "geodistance:";

/// One key of a sort specification
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Field { field: String, direction: Order },
    GeoDistance { lat: f64, lon: f64, direction: Order },
}

impl SortKey {
    pub fn direction(&self) -> Order {
        match self {
            SortKey::Field { direction, .. } | SortKey::GeoDistance { direction, .. } => *direction,
        }
    }

    pub fn is_descending(&self) -> bool {
        self.direction() == Order::Desc
    }

    /// The same key scanned the other way
    pub fn inverted(&self) -> Self {
        let flip = |d: Order| match d {
            Order::Asc => Order::Desc,
            Order::Desc => Order::Asc,
        };
        match self {
            SortKey::Field { field, direction } => SortKey::Field {
                field: field.clone(),
                direction: flip(*direction),
            },
            SortKey::GeoDistance { lat, lon, direction } => SortKey::GeoDistance {
                lat: *lat,
                lon: *lon,
                direction: flip(*direction),
            },
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_descending() { "-" } else { "" };
        match self {
            SortKey::Field { field, .. } => write!(f, "{}{}", sign, field),
            SortKey::GeoDistance { lat, lon, .. } => {
                write!(f, "{}{}{} {}", sign, GEO_DISTANCE_PREFIX, lat, lon)
            }
        }
    }
}

fn parse_point(token: &str, raw: &str) -> ExploreResult<(f64, f64)> {
    let invalid = || {
        ExploreError::invalid_parameter(format!(
            "Invalid geo-distance sort '{}': expected 'LAT LON'",
            raw
        ))
    };
    let mut parts = token.split_whitespace();
    let lat: f64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
    let lon: f64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
    if parts.next().is_some() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon)
    {
        return Err(invalid());
    }
    Ok((lat, lon))
}

fn parse_token(raw: &str) -> ExploreResult<SortKey> {
    let token = raw.trim();
    if token.is_empty() || token == "-" {
        return Err(ExploreError::invalid_parameter(format!(
            "Invalid sort token '{}'",
            raw
        )));
    }

    let (direction, unsigned) = match token.strip_prefix('-') {
        Some(rest) => (Order::Desc, rest),
        None => (Order::Asc, token.strip_prefix('+').unwrap_or(token)),
    };

    if let Some(point) = unsigned.strip_prefix(GEO_DISTANCE_PREFIX) {
        let (lat, lon) = parse_point(point, raw)?;
        return Ok(SortKey::GeoDistance { lat, lon, direction });
    }

    if token.contains(char::is_whitespace) {
        let (lat, lon) = parse_point(token, raw)?;
        return Ok(SortKey::GeoDistance {
            lat,
            lon,
            direction: Order::Asc,
        });
    }

    Ok(SortKey::Field {
        field: unsigned.to_string(),
        direction,
    })
}

/// Parses a sort specification
pub fn parse_sort(spec: &str) -> ExploreResult<Vec<SortKey>> {
    let keys = spec
        .split(',')
        .map(parse_token)
        .collect::<ExploreResult<Vec<_>>>()?;
    let geo_keys = keys
        .iter()
        .filter(|k| matches!(k, SortKey::GeoDistance { .. }))
        .count();
    if geo_keys > 1 {
        return Err(ExploreError::invalid_parameter(format!(
            "Invalid sort '{}': only one geo-distance key is allowed",
            spec
        )));
    }
    Ok(keys)
}

/// Flips the direction of every key of a sort specification
pub fn invert_sort(spec: &str) -> ExploreResult<String> {
    let inverted: Vec<String> = parse_sort(spec)?
        .iter()
        .map(|k| k.inverted().to_string())
        .collect();
    Ok(inverted.join(","))
}

/// Parses a cursor against the sort keys it was built from.
///
/// The sort must end the tie on the id path unless it contains a
/// geo-distance key.
pub fn parse_cursor(keys: &[SortKey], cursor: &str, id_path: &str) -> ExploreResult<Vec<Scalar>> {
    let has_geo = keys.iter().any(|k| matches!(k, SortKey::GeoDistance { .. }));
    let has_id = keys
        .iter()
        .any(|k| matches!(k, SortKey::Field { field, .. } if field == id_path));
    if !has_geo && !has_id {
        return Err(ExploreError::invalid_parameter(format!(
            "Sort must include the id field '{}' to use a cursor",
            id_path
        )));
    }

    let values: Vec<&str> = cursor.split(',').map(str::trim).collect();
    if values.len() != keys.len() || values.iter().any(|v| v.is_empty()) {
        return Err(ExploreError::invalid_parameter(format!(
            "Cursor '{}' must hold one value per sort field ({} expected)",
            cursor,
            keys.len()
        )));
    }

    keys.iter()
        .zip(values)
        .map(|(key, raw)| {
            let value = Scalar::parse(raw);
            if matches!(key, SortKey::GeoDistance { .. }) && !value.is_number() {
                return Err(ExploreError::invalid_parameter(format!(
                    "Cursor value '{}' of a geo-distance sort must be a number",
                    raw
                )));
            }
            Ok(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, direction: Order) -> SortKey {
        SortKey::Field {
            field: name.to_string(),
            direction,
        }
    }

    #[test]
    fn test_parse_field_tokens() {
        let keys = parse_sort("-count, id").unwrap();
        assert_eq!(keys, vec![field("count", Order::Desc), field("id", Order::Asc)]);
    }

    #[test]
    fn test_parse_geo_distance_tokens() {
        let keys = parse_sort("-geodistance:43.6 1.44").unwrap();
        assert_eq!(
            keys,
            vec![SortKey::GeoDistance {
                lat: 43.6,
                lon: 1.44,
                direction: Order::Desc
            }]
        );

        // bare form: the minus belongs to the latitude
        let keys = parse_sort("-43.6 1.44").unwrap();
        assert_eq!(
            keys,
            vec![SortKey::GeoDistance {
                lat: -43.6,
                lon: 1.44,
                direction: Order::Asc
            }]
        );
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(parse_sort("").is_err());
        assert!(parse_sort("a,,b").is_err());
        assert!(parse_sort("-").is_err());
        assert!(parse_sort("95 1").is_err());
        assert!(parse_sort("geodistance:1").is_err());
        assert!(parse_sort("1 1,geodistance:2 2").is_err());
    }

    #[test]
    fn test_invert_sort() {
        assert_eq!(invert_sort("-count,id").unwrap(), "count,-id");
        assert_eq!(invert_sort("43.6 1.44").unwrap(), "-geodistance:43.6 1.44");
        let twice = invert_sort(&invert_sort("-a,b,geodistance:1 2").unwrap()).unwrap();
        assert_eq!(twice, "-a,b,geodistance:1 2");
    }

    #[test]
    fn test_cursor_values_typed() {
        let keys = parse_sort("-count,name,id").unwrap();
        let values = parse_cursor(&keys, "10,abc,5", "id").unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Integer(10),
                Scalar::Text("abc".to_string()),
                Scalar::Integer(5)
            ]
        );
    }

    #[test]
    fn test_cursor_requires_id_unless_geo() {
        let keys = parse_sort("-count").unwrap();
        assert!(parse_cursor(&keys, "10", "id").is_err());

        let keys = parse_sort("-count,geodistance:1 2").unwrap();
        assert!(parse_cursor(&keys, "10,1523.5", "id").is_ok());
        assert!(parse_cursor(&keys, "10,far", "id").is_err());
    }

    #[test]
    fn test_cursor_arity() {
        let keys = parse_sort("-count,id").unwrap();
        let err = parse_cursor(&keys, "10", "id").unwrap_err();
        assert!(err.message().contains("one value per sort field"));
        assert!(parse_cursor(&keys, "10,5,1", "id").is_err());
    }
}
