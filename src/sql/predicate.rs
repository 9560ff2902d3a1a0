//! Condition rendering for SQL `WHERE` clauses

use super::writer::{quote, SqlWriter};
use crate::errors::{ExploreError, ExploreResult};
use crate::geo::to_wkt;
use crate::planner::{
    Condition, ConditionGroup, ConditionSet, Scalar, SortKey, SpatialRelation, ValueRange,
};

/// Spatial reference of filter shapes
pub const SRID: u32 = 4326;

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn placeholders(values: &[Scalar], writer: &mut SqlWriter) -> String {
    values
        .iter()
        .map(|v| writer.bind(v.clone()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn range_predicate(column: &str, range: &ValueRange, writer: &mut SqlWriter) -> String {
    let lower = if range.min_inclusive { ">=" } else { ">" };
    let upper = if range.max_inclusive { "<=" } else { "<" };
    format!(
        "({column} {lower} {} AND {column} {upper} {})",
        writer.bind(range.min.clone()),
        writer.bind(range.max.clone()),
    )
}

/// Renders one condition
pub fn condition_sql(condition: &Condition, writer: &mut SqlWriter) -> ExploreResult<String> {
    let sql = match condition {
        Condition::In { field, values } => {
            let column = quote(field);
            if values.len() == 1 {
                format!("{} = {}", column, writer.bind(values[0].clone()))
            } else {
                format!("{} IN ({})", column, placeholders(values, writer))
            }
        }
        Condition::NotIn { field, values } => {
            let column = quote(field);
            format!(
                "({column} IS NULL OR {column} NOT IN ({}))",
                placeholders(values, writer)
            )
        }
        Condition::Compare {
            field, op, value, ..
        } => format!("{} {} {}", quote(field), op.symbol(), writer.bind(value.clone())),
        Condition::Like { field, pattern } => format!(
            "{} LIKE {}",
            quote(field),
            writer.bind(Scalar::Text(format!("%{}%", escape_like(pattern))))
        ),
        Condition::Ranges { field, ranges, .. } => {
            let column = quote(field);
            let parts: Vec<String> = ranges
                .iter()
                .map(|r| range_predicate(&column, r, writer))
                .collect();
            if parts.len() == 1 {
                parts.join("")
            } else {
                format!("({})", parts.join(" OR "))
            }
        }
        Condition::Spatial {
            field,
            relation,
            negated,
            shape,
        } => {
            let column = quote(field);
            let function = match relation {
                SpatialRelation::Within => "ST_Within",
                SpatialRelation::Intersects => "ST_Intersects",
            };
            let test = format!(
                "{}({}, ST_GeomFromText({}, {}))",
                function,
                column,
                writer.bind(Scalar::Text(to_wkt(shape))),
                SRID
            );
            if *negated {
                format!("({} IS NULL OR NOT {})", column, test)
            } else {
                test
            }
        }
        Condition::Text {
            field: Some(field),
            text,
        } => format!(
            "CAST({} AS TEXT) ILIKE {}",
            quote(field),
            writer.bind(Scalar::Text(format!("%{}%", escape_like(text))))
        ),
        Condition::Text { field: None, text } => {
            return Err(ExploreError::not_allowed(format!(
                "Full-text search without a field is not supported by the relational backend: '{}'",
                text
            )))
        }
    };
    Ok(sql)
}

/// Renders an OR-group
pub fn group_sql(group: &ConditionGroup, writer: &mut SqlWriter) -> ExploreResult<String> {
    let parts = group
        .conditions()
        .iter()
        .map(|c| condition_sql(c, writer))
        .collect::<ExploreResult<Vec<_>>>()?;
    Ok(if parts.len() == 1 {
        parts.join("")
    } else {
        format!("({})", parts.join(" OR "))
    })
}

/// Renders AND-ed groups, or None when there is nothing to filter
pub fn filter_sql(set: &ConditionSet, writer: &mut SqlWriter) -> ExploreResult<Option<String>> {
    if set.is_empty() {
        return Ok(None);
    }
    let parts = set
        .groups()
        .iter()
        .map(|g| group_sql(g, writer))
        .collect::<ExploreResult<Vec<_>>>()?;
    Ok(Some(parts.join(" AND ")))
}

/// Expression a sort key orders on; distances are in meters from
/// `centroid_path`
pub fn sort_expression(key: &SortKey, centroid_path: &str) -> String {
    match key {
        SortKey::Field { field, .. } => quote(field),
        SortKey::GeoDistance { lat, lon, .. } => format!(
            "ST_Distance(CAST({} AS geography), CAST(ST_SetSRID(ST_MakePoint({}, {}), {}) AS geography))",
            quote(centroid_path),
            lon,
            lat,
            SRID
        ),
    }
}

/// Rows strictly after `values` in the order of `keys`:
/// `(k0 > v0) OR (k0 = v0 AND k1 > v1) OR ...`, with `<` for descending keys
pub fn keyset_sql(
    keys: &[SortKey],
    values: &[Scalar],
    centroid_path: &str,
    writer: &mut SqlWriter,
) -> String {
    let expressions: Vec<String> = keys
        .iter()
        .map(|k| sort_expression(k, centroid_path))
        .collect();

    let mut branches = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let mut terms: Vec<String> = (0..i)
            .map(|j| format!("{} = {}", expressions[j], writer.bind(values[j].clone())))
            .collect();
        let op = if key.is_descending() { "<" } else { ">" };
        terms.push(format!(
            "{} {} {}",
            expressions[i],
            op,
            writer.bind(values[i].clone())
        ));
        branches.push(format!("({})", terms.join(" AND ")));
    }
    format!("({})", branches.join(" OR "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{parse_sort, Comparison};

    #[test]
    fn test_not_in_keeps_nulls() {
        let mut writer = SqlWriter::new();
        let sql = condition_sql(
            &Condition::NotIn {
                field: "status".to_string(),
                values: vec![Scalar::Text("A".into()), Scalar::Text("B".into())],
            },
            &mut writer,
        )
        .unwrap();
        assert_eq!(sql, "(\"status\" IS NULL OR \"status\" NOT IN ($1, $2))");
    }

    #[test]
    fn test_range_brackets() {
        let mut writer = SqlWriter::new();
        let sql = condition_sql(
            &Condition::Ranges {
                field: "speed".to_string(),
                ranges: vec![
                    ValueRange {
                        min: Scalar::Integer(0),
                        max: Scalar::Integer(10),
                        min_inclusive: true,
                        max_inclusive: false,
                    },
                    ValueRange {
                        min: Scalar::Integer(20),
                        max: Scalar::Integer(30),
                        min_inclusive: false,
                        max_inclusive: true,
                    },
                ],
                is_date: false,
            },
            &mut writer,
        )
        .unwrap();
        assert_eq!(
            sql,
            "((\"speed\" >= $1 AND \"speed\" < $2) OR (\"speed\" > $3 AND \"speed\" <= $4))"
        );
    }

    #[test]
    fn test_like_escapes_wildcards() {
        let mut writer = SqlWriter::new();
        condition_sql(
            &Condition::Like {
                field: "name".to_string(),
                pattern: "50%_off".to_string(),
            },
            &mut writer,
        )
        .unwrap();
        assert_eq!(
            writer.into_params(),
            vec![Scalar::Text("%50\\%\\_off%".to_string())]
        );
    }

    #[test]
    fn test_unscoped_text_rejected() {
        let mut writer = SqlWriter::new();
        let err = condition_sql(
            &Condition::Text {
                field: None,
                text: "late".to_string(),
            },
            &mut writer,
        )
        .unwrap_err();
        assert_eq!(err.code(), crate::errors::ExploreErrorCode::NotAllowed);
    }

    #[test]
    fn test_groups_and_set() {
        let mut set = ConditionSet::new();
        set.add(ConditionGroup(vec![
            Condition::Compare {
                field: "speed".to_string(),
                op: Comparison::Gt,
                value: Scalar::Integer(1),
                is_date: false,
            },
            Condition::In {
                field: "status".to_string(),
                values: vec![Scalar::Text("A".into())],
            },
        ]));
        set.add(ConditionGroup(vec![Condition::Compare {
            field: "speed".to_string(),
            op: Comparison::Lt,
            value: Scalar::Integer(9),
            is_date: false,
        }]));
        let mut writer = SqlWriter::new();
        let sql = filter_sql(&set, &mut writer).unwrap().unwrap();
        assert_eq!(
            sql,
            "(\"speed\" > $1 OR \"status\" = $2) AND \"speed\" < $3"
        );
    }

    #[test]
    fn test_keyset_mixed_directions() {
        let keys = parse_sort("-count,id").unwrap();
        let mut writer = SqlWriter::new();
        let sql = keyset_sql(
            &keys,
            &[Scalar::Integer(10), Scalar::Integer(5)],
            "position",
            &mut writer,
        );
        assert_eq!(
            sql,
            "((\"count\" < $1) OR (\"count\" = $2 AND \"id\" > $3))"
        );
        assert_eq!(writer.into_params().len(), 3);
    }
}
