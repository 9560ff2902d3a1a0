//! Backend capability interfaces
//!
//! A backend is a `QueryCompiler` that accumulates a native plan and a
//! `ResultAssembler` that turns the native result back into canonical
//! responses. Shared validation happens before either is called.

use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::aggregation::AggregationPlan;
use super::conditions::{ConditionBuilder, ConditionGroup};
use crate::errors::ExploreResult;
use crate::model::{
    AggregationResponse, CollectionReference, ComputationMetric, ComputationResponse,
    FieldTypeResolver, FilterExpression, Hits, MultiValueFilter,
};

/// Features a backend can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `top_hits`-style raw geometry sub-aggregations
    pub raw_geometries: bool,
    /// Documents fetched per bucket
    pub fetch_hits: bool,
    /// Full-text search without a field
    pub unscoped_full_text: bool,
    /// Count of documents left out of truncated term buckets
    pub tracks_other_doc_count: bool,
}

/// Collection and field types a compiler works against
#[derive(Clone)]
pub struct CompilerContext {
    pub collection: Arc<CollectionReference>,
    pub resolver: Arc<dyn FieldTypeResolver>,
}

impl CompilerContext {
    pub fn new(collection: Arc<CollectionReference>, resolver: Arc<dyn FieldTypeResolver>) -> Self {
        Self {
            collection,
            resolver,
        }
    }

    pub fn conditions(&self) -> ConditionBuilder<'_> {
        ConditionBuilder::new(&self.collection, self.resolver.as_ref())
    }
}

/// Accumulates one request into a backend plan
pub trait QueryCompiler {
    type Plan;

    fn capabilities(&self) -> Capabilities;

    fn context(&self) -> &CompilerContext;

    /// Adds a validated OR-group, AND-ed with the groups already added
    fn push_group(&mut self, group: ConditionGroup);

    /// Adds an OR-group of filter expressions
    fn filter(
        &mut self,
        filter: &MultiValueFilter<FilterExpression>,
        date_format: Option<&str>,
    ) -> ExploreResult<()> {
        let group = self.context().conditions().group(filter, date_format)?;
        self.push_group(group);
        Ok(())
    }

    /// Adds an OR-group of `field:text` searches
    fn filter_q(&mut self, queries: &MultiValueFilter<String>) -> ExploreResult<()> {
        let unscoped = self.capabilities().unscoped_full_text;
        let group = self.context().conditions().text_group(queries, unscoped)?;
        self.push_group(group);
        Ok(())
    }

    fn filter_size(&mut self, size: usize, from: usize);

    /// Orders hits; an inverted specification is expected for `before`
    /// cursors.
    fn sort(&mut self, sort: &str) -> ExploreResult<()>;

    /// Restricts hits to those strictly after `cursor` in `sort` order
    fn search_after(&mut self, sort: &str, cursor: &str) -> ExploreResult<()>;

    fn aggregate(&mut self, plan: &AggregationPlan) -> ExploreResult<()>;

    fn compute(&mut self, field: &str, metric: ComputationMetric) -> ExploreResult<()>;

    fn build(self) -> ExploreResult<Self::Plan>;
}

/// Turns native backend results into canonical responses
pub trait ResultAssembler {
    type Native;

    fn assemble_aggregation(
        &self,
        native: &Self::Native,
        plan: &AggregationPlan,
    ) -> ExploreResult<AggregationResponse>;

    /// `reverse` restores the requested order after a `before` scan
    fn assemble_hits(&self, native: &Self::Native, reverse: bool) -> ExploreResult<Hits>;

    /// Returns the computation without query time
    fn assemble_computation(
        &self,
        native: &Self::Native,
        field: &str,
        metric: ComputationMetric,
    ) -> ExploreResult<ComputationResponse>;
}

/// A backend: compiler and assembler factories
pub trait Backend {
    type Plan: Serialize + Debug;
    type Native: DeserializeOwned;
    type Compiler: QueryCompiler<Plan = Self::Plan>;
    type Assembler: ResultAssembler<Native = Self::Native>;

    fn name(&self) -> &'static str;

    fn compiler(&self, context: CompilerContext) -> Self::Compiler;

    fn assembler(&self, collection: Arc<CollectionReference>) -> Self::Assembler;
}

/// Executes plans; provided by the caller
pub trait BackendClient<P, N> {
    fn execute(&self, plan: &P) -> ExploreResult<N>;
}

impl<P, N, T: BackendClient<P, N> + ?Sized> BackendClient<P, N> for &T {
    fn execute(&self, plan: &P) -> ExploreResult<N> {
        (**self).execute(plan)
    }
}
