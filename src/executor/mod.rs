//! Request execution
//!
//! `ExploreService` drives one request through validation, compilation,
//! the caller-supplied backend client and result assembly.
//! `ComputationExecutor` does the same for single-value computations and
//! times them on its own.

mod computation;
mod filters;
mod service;

pub use computation::ComputationExecutor;
pub use filters::apply_filters;
pub use service::{ExploreService, DEFAULT_MAX_PAGE_SIZE};
