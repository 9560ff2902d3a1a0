//! Date pattern handling
//!
//! Patterns use the Joda-style letters clients send (`yyyy-MM-dd'T'HH:mm:ss`)
//! and are translated to chrono format strings. All dates are UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::errors::{ExploreError, ExploreResult};

/// Display pattern of date histogram keys when none is given
pub const DEFAULT_KEY_FORMAT: &str = "yyyy-MM-dd-hh:mm:ss";

pub const EPOCH_MILLIS: &str = "epoch_millis";
pub const EPOCH_SECOND: &str = "epoch_second";

/// Translates a Joda-style pattern into a chrono format string
pub fn to_chrono_pattern(pattern: &str) -> ExploreResult<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            let end = chars[i + 1..]
                .iter()
                .position(|&q| q == '\'')
                .map(|p| i + 1 + p)
                .ok_or_else(|| {
                    ExploreError::invalid_parameter(format!(
                        "Unterminated literal in date format '{}'",
                        pattern
                    ))
                })?;
            for &literal in &chars[i + 1..end] {
                push_literal(&mut out, literal);
            }
            i = end + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&r| r == c).count();
        let token = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) | ('Y', _) | ('u', _) => "%Y",
            ('M', 1) | ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', _) => "%d",
            ('D', _) => "%j",
            ('H', _) => "%H",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('Z', _) => "%z",
            _ => {
                return Err(ExploreError::invalid_parameter(format!(
                    "Unsupported letter '{}' in date format '{}'",
                    c, pattern
                )))
            }
        };
        out.push_str(token);
        i += run;
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Checks that a pattern can be used
pub fn validate_format(format: &str) -> ExploreResult<()> {
    if format == EPOCH_MILLIS || format == EPOCH_SECOND {
        return Ok(());
    }
    to_chrono_pattern(format).map(|_| ())
}

/// Parses a date value through `format` into epoch milliseconds
pub fn parse_date(value: &str, format: &str) -> ExploreResult<i64> {
    let invalid = || {
        ExploreError::invalid_parameter(format!(
            "Date '{}' does not match format '{}'",
            value, format
        ))
    };
    let value = value.trim();

    match format {
        EPOCH_MILLIS => value.parse::<i64>().map_err(|_| invalid()),
        EPOCH_SECOND => value
            .parse::<i64>()
            .map(|s| s.saturating_mul(1000))
            .map_err(|_| invalid()),
        pattern => {
            let chrono_pattern = to_chrono_pattern(pattern)?;
            if let Ok(dt) = DateTime::parse_from_str(value, &chrono_pattern) {
                return Ok(dt.timestamp_millis());
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, &chrono_pattern) {
                return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
            }
            let date = NaiveDate::parse_from_str(value, &chrono_pattern).map_err(|_| invalid())?;
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
            Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
        }
    }
}

/// Formats epoch milliseconds with `format`, in UTC
pub fn format_epoch_millis(millis: i64, format: &str) -> ExploreResult<String> {
    match format {
        EPOCH_MILLIS => Ok(millis.to_string()),
        EPOCH_SECOND => Ok((millis / 1000).to_string()),
        pattern => {
            let chrono_pattern = to_chrono_pattern(pattern)?;
            let dt = Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
                ExploreError::invalid_parameter(format!("Timestamp {} is out of range", millis))
            })?;
            Ok(dt.format(&chrono_pattern).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_translation() {
        assert_eq!(
            to_chrono_pattern("yyyy-MM-dd'T'HH:mm:ss").unwrap(),
            "%Y-%m-%dT%H:%M:%S"
        );
        assert_eq!(to_chrono_pattern(DEFAULT_KEY_FORMAT).unwrap(), "%Y-%m-%d-%I:%M:%S");
        assert_eq!(to_chrono_pattern("dd MMM yy").unwrap(), "%d %b %y");
        assert_eq!(to_chrono_pattern("HH:mm:ss.SSS").unwrap(), "%H:%M:%S.%3f");
    }

    #[test]
    fn test_bad_patterns() {
        assert!(to_chrono_pattern("yyyy-'MM").is_err());
        assert!(to_chrono_pattern("yyyy-QQ").is_err());
        assert!(validate_format(EPOCH_SECOND).is_ok());
    }

    #[test]
    fn test_parse_dates() {
        assert_eq!(parse_date("1577836800000", EPOCH_MILLIS).unwrap(), 1_577_836_800_000);
        assert_eq!(parse_date("1577836800", EPOCH_SECOND).unwrap(), 1_577_836_800_000);
        assert_eq!(
            parse_date("2020-01-01T00:00:00", "yyyy-MM-dd'T'HH:mm:ss").unwrap(),
            1_577_836_800_000
        );
        assert_eq!(parse_date("2020-01-02", "yyyy-MM-dd").unwrap(), 1_577_923_200_000);
    }

    #[test]
    fn test_parse_date_mismatch() {
        let err = parse_date("01/02/2020", "yyyy-MM-dd").unwrap_err();
        assert!(err.message().contains("does not match"));
        assert!(parse_date("soon", EPOCH_MILLIS).is_err());
    }

    #[test]
    fn test_format_epoch_millis_utc() {
        // 2020-01-01T15:30:00Z
        let millis = 1_577_892_600_000;
        assert_eq!(
            format_epoch_millis(millis, DEFAULT_KEY_FORMAT).unwrap(),
            "2020-01-01-03:30:00"
        );
        assert_eq!(format_epoch_millis(millis, "yyyy-MM-dd HH:mm").unwrap(), "2020-01-01 15:30");
        assert_eq!(format_epoch_millis(millis, EPOCH_SECOND).unwrap(), "1577892600");
    }
}
