//! Backend-neutral compilation base
//!
//! Everything both backends must agree on lives here: range and date
//! parsing, sort and cursor rules, filter validation and aggregation
//! validation. Backends only differ in what they render and what they
//! are capable of executing.

mod aggregation;
mod buckets;
mod compiler;
mod conditions;
mod dates;
mod range;
mod sorting;

pub use aggregation::{
    aggregated_geometry_name, check_computation, metric_name, AggregationKind, AggregationLevel,
    AggregationPlan, BucketOrder, FetchPlan, MetricSource, PlannedMetric, RawGeometryGroup,
    FETCHED_HITS, MAX_GEOTILE_PRECISION,
};
pub use buckets::{
    aggregated_geometries, as_count, bbox_center, bbox_polygon, bucket_node, cell_bbox, metric,
    metric_source_name, other_doc_count,
};
pub use compiler::{
    Backend, BackendClient, Capabilities, CompilerContext, QueryCompiler, ResultAssembler,
};
pub use conditions::{
    Comparison, Condition, ConditionBuilder, ConditionGroup, ConditionSet, SpatialRelation,
};
pub use dates::{
    format_epoch_millis, parse_date, to_chrono_pattern, validate_format, DEFAULT_KEY_FORMAT,
    EPOCH_MILLIS, EPOCH_SECOND,
};
pub use range::{check_range_validity, parse_ranges, Scalar, ValueRange};
pub use sorting::{invert_sort, parse_cursor, parse_sort, SortKey};
