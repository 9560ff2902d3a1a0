//! Aggregation statements for the relational backend
//!
//! Level `d` is one `GROUP BY` over the keys of levels `0..=d`. Buckets
//! are ranked inside their parent with `ROW_NUMBER()`, which implements
//! both the level order and its size. Rows come back ordered by parent
//! keys, then rank, so the assembler can attach them in one pass.

use super::predicate::filter_sql;
use super::writer::{quote, SqlWriter};
use crate::errors::ExploreResult;
use crate::geo::MAX_MERCATOR_LATITUDE;
use crate::model::{AggregatedGeometry, CollectFunction, ComputationMetric, Order};
use crate::planner::{
    aggregated_geometry_name, AggregationKind, AggregationLevel, AggregationPlan, BucketOrder,
    ConditionSet, Scalar,
};

/// Column holding the document count of a bucket
pub const COUNT_COLUMN: &str = "count";
/// Column holding the rank of a bucket inside its parent
pub const RANK_COLUMN: &str = "bucket_rank";
/// Column holding a computation result
pub const VALUE_COLUMN: &str = "value";
/// Column holding the number of matching rows
pub const TOTAL_COLUMN: &str = "totalnb";

/// Column of the bucket key of level `depth`
pub fn key_column(depth: usize) -> String {
    format!("key_{}", depth)
}

/// Columns of a bounding box result, west/south/east/north
pub fn bbox_columns(name: &str) -> [String; 4] {
    [
        format!("{}_west", name),
        format!("{}_south", name),
        format!("{}_east", name),
        format!("{}_north", name),
    ]
}

/// Columns of a centroid result, lon/lat
pub fn centroid_columns(name: &str) -> [String; 2] {
    [format!("{}_lon", name), format!("{}_lat", name)]
}

fn direction(order: Order) -> &'static str {
    match order {
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    }
}

fn tile_expression(column: &str, zoom: u8) -> String {
    let n = 1u64 << zoom;
    let max_index = n - 1;
    let lat = format!(
        "RADIANS(LEAST(GREATEST(ST_Y({}), -{}), {}))",
        column, MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE
    );
    let x = format!("FLOOR((ST_X({}) + 180.0) / 360.0 * {})", column, n);
    let y = format!(
        "FLOOR((1.0 - LN(TAN({lat}) + 1.0 / COS({lat})) / PI()) / 2.0 * {n})",
        lat = lat,
        n = n
    );
    let clamp = |e: String| format!("CAST(LEAST(GREATEST({}, 0), {}) AS BIGINT)", e, max_index);
    format!("CONCAT({}, '/', {}, '/', {})", zoom, clamp(x), clamp(y))
}

/// Expression computing the bucket key of a level
pub fn key_expression(level: &AggregationLevel) -> String {
    let column = quote(&level.field);
    match level.kind {
        AggregationKind::Term => column,
        AggregationKind::Histogram { interval } => {
            format!("FLOOR({} / {}) * {}", column, interval, interval)
        }
        AggregationKind::DateHistogram { unit, multiplier } => match unit.fixed_millis() {
            Some(millis) => {
                let width = millis * i64::from(multiplier);
                format!(
                    "CAST(FLOOR({} / {}.0) * {} AS BIGINT)",
                    column, width, width
                )
            }
            None => format!(
                "CAST(EXTRACT(EPOCH FROM DATE_TRUNC('{}', TO_TIMESTAMP({} / 1000.0) AT TIME ZONE 'UTC')) * 1000 AS BIGINT)",
                unit.name(),
                column
            ),
        },
        AggregationKind::Geohash { precision } => format!("ST_GeoHash({}, {})", column, precision),
        AggregationKind::Geotile { precision } => tile_expression(&column, precision),
    }
}

fn bbox_select(column: &str, name: &str) -> Vec<String> {
    let [west, south, east, north] = bbox_columns(name);
    vec![
        format!("ST_XMin(ST_Extent({})) AS {}", column, quote(&west)),
        format!("ST_YMin(ST_Extent({})) AS {}", column, quote(&south)),
        format!("ST_XMax(ST_Extent({})) AS {}", column, quote(&east)),
        format!("ST_YMax(ST_Extent({})) AS {}", column, quote(&north)),
    ]
}

fn centroid_select(column: &str, name: &str) -> Vec<String> {
    let [lon, lat] = centroid_columns(name);
    vec![
        format!("AVG(ST_X({})) AS {}", column, quote(&lon)),
        format!("AVG(ST_Y({})) AS {}", column, quote(&lat)),
    ]
}

fn metric_select(function: CollectFunction, field: &str, name: &str) -> Vec<String> {
    let column = quote(field);
    match function {
        CollectFunction::GeoBBox => bbox_select(&column, name),
        CollectFunction::GeoCentroid => centroid_select(&column, name),
        CollectFunction::Cardinality => {
            vec![format!("COUNT(DISTINCT {}) AS {}", column, quote(name))]
        }
        other => vec![format!(
            "{}({}) AS {}",
            other.as_str().to_uppercase(),
            column,
            quote(name)
        )],
    }
}

fn level_columns(level: &AggregationLevel, centroid_path: &str) -> Vec<String> {
    let mut columns = Vec::new();
    for metric in level.own_metrics() {
        columns.extend(metric_select(metric.function, &metric.field, &metric.name));
    }
    for geometry in level.computed_geometries() {
        let name = aggregated_geometry_name(geometry);
        let column = quote(centroid_path);
        match geometry {
            AggregatedGeometry::Bbox => columns.extend(bbox_select(&column, &name)),
            _ => columns.extend(centroid_select(&column, &name)),
        }
    }
    columns
}

fn rank_order(level: &AggregationLevel) -> String {
    let key = quote(&key_column(level.depth));
    match &level.order {
        Some(BucketOrder::Key(order)) => format!("{} {}", key, direction(*order)),
        Some(BucketOrder::Count(order)) => {
            format!("{} {}, {} ASC", quote(COUNT_COLUMN), direction(*order), key)
        }
        Some(BucketOrder::Metric { name, order }) => {
            format!("{} {}, {} ASC", quote(name), direction(*order), key)
        }
        None => format!("{} DESC, {} ASC", quote(COUNT_COLUMN), key),
    }
}

/// `WHERE` clause from filters plus extra conjuncts
pub fn where_clause(
    filters: &ConditionSet,
    extra: &[String],
    writer: &mut SqlWriter,
) -> ExploreResult<String> {
    let mut parts = Vec::new();
    if let Some(filter) = filter_sql(filters, writer)? {
        parts.push(filter);
    }
    parts.extend(extra.iter().cloned());
    Ok(if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    })
}

/// Statement returning the buckets of level `depth`
pub fn level_statement(
    plan: &AggregationPlan,
    depth: usize,
    table: &str,
    centroid_path: &str,
    filters: &ConditionSet,
) -> ExploreResult<(String, Vec<Scalar>)> {
    let levels = &plan.levels[..=depth];
    let level = &levels[depth];
    let mut writer = SqlWriter::new();

    let not_null: Vec<String> = levels
        .iter()
        .map(|l| format!("{} IS NOT NULL", quote(&l.field)))
        .collect();
    let where_sql = where_clause(filters, &not_null, &mut writer)?;

    let mut select: Vec<String> = levels
        .iter()
        .map(|l| format!("{} AS {}", key_expression(l), quote(&key_column(l.depth))))
        .collect();
    select.push(format!("COUNT(*) AS {}", quote(COUNT_COLUMN)));
    select.extend(level_columns(level, centroid_path));

    let group_by: Vec<String> = (1..=levels.len()).map(|i| i.to_string()).collect();
    let parents: Vec<String> = (0..depth).map(|d| quote(&key_column(d))).collect();
    let partition = if parents.is_empty() {
        String::new()
    } else {
        format!("PARTITION BY {} ", parents.join(", "))
    };

    let grouped = format!(
        "SELECT {} FROM {}{} GROUP BY {}",
        select.join(", "),
        quote(table),
        where_sql,
        group_by.join(", ")
    );
    let ranked = format!(
        "SELECT grouped.*, ROW_NUMBER() OVER ({}ORDER BY {}) AS {} FROM ({}) AS grouped",
        partition,
        rank_order(level),
        quote(RANK_COLUMN),
        grouped
    );

    let mut sql = format!("SELECT * FROM ({}) AS ranked", ranked);
    if let Some(size) = level.size {
        sql.push_str(&format!(" WHERE {} <= {}", quote(RANK_COLUMN), size));
    }
    let mut order_by = parents;
    order_by.push(quote(RANK_COLUMN));
    sql.push_str(&format!(" ORDER BY {}", order_by.join(", ")));

    Ok((sql, writer.into_params()))
}

/// Select list of a computation
pub fn computation_columns(field: &str, metric: ComputationMetric) -> Vec<String> {
    let column = quote(field);
    match metric {
        ComputationMetric::Spanning => vec![format!(
            "MAX({}) - MIN({}) AS {}",
            column,
            column,
            quote(VALUE_COLUMN)
        )],
        ComputationMetric::GeoBBox => bbox_select(&column, VALUE_COLUMN),
        ComputationMetric::GeoCentroid => centroid_select(&column, VALUE_COLUMN),
        ComputationMetric::Cardinality => vec![format!(
            "COUNT(DISTINCT {}) AS {}",
            column,
            quote(VALUE_COLUMN)
        )],
        other => vec![format!(
            "{}({}) AS {}",
            other.as_str().to_uppercase(),
            column,
            quote(VALUE_COLUMN)
        )],
    }
}
