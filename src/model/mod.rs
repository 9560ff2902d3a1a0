//! Data model
//!
//! All objects are created per request, mutated only by the compiling
//! component that owns them, and discarded once the response is
//! serialized.

mod aggregation;
mod collection;
mod filter;
mod page;
mod request;
mod response;

pub use aggregation::{
    AggregatedGeometry, AggregationSpec, AggregationType, CollectFunction, ComputationMetric,
    DateUnit, FetchHits, Interval, Metric, Order, OrderOn, RawGeometry,
};
pub use collection::{CollectionReference, FieldType, FieldTypeResolver, StaticFieldTypes};
pub use filter::{FilterExpression, MultiValueFilter, Operator};
pub use page::{CursorDirection, Page, DEFAULT_PAGE_SIZE};
pub use request::{
    AggregationRequest, ComputationRequest, ExploreRequest, FilterRequest, SearchRequest,
};
pub use response::{
    AggregationMetric, AggregationResponse, ComputationResponse, Hit, Hits, ReturnedGeometry,
};
