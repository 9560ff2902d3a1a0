//! geoexplore - geospatial query and aggregation translation
//!
//! Compiles collection-scoped exploration requests (filters, paging,
//! multi-level aggregations, single-value computations) into plans for a
//! document-search backend or a relational backend, and assembles what the
//! backend returns into one canonical response shape.

pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod geo;
pub mod model;
pub mod planner;
pub mod search;
pub mod sql;

pub use errors::{ExploreError, ExploreErrorCode, ExploreResult};
