//! Request orchestration for one collection
//!
//! Every request is validated and compiled in full before the backend is
//! called, so translation errors never reach it. Backend errors are passed
//! through with the collection name as context and are never retried.

use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use super::computation::ComputationExecutor;
use super::filters::apply_filters;
use crate::errors::{ExploreError, ExploreResult};
use crate::model::{
    AggregationRequest, AggregationResponse, CollectionReference, ComputationRequest,
    ComputationResponse, CursorDirection, Hits, Page, SearchRequest,
};
use crate::planner::{
    invert_sort, AggregationPlan, Backend, BackendClient, CompilerContext, QueryCompiler,
    ResultAssembler,
};

/// Largest `from + size` accepted by default
pub const DEFAULT_MAX_PAGE_SIZE: usize = 10_000;

/// Compiles, runs and assembles requests against one collection
pub struct ExploreService<B: Backend, C> {
    backend: B,
    client: C,
    context: CompilerContext,
    max_page_size: usize,
}

impl<B, C> ExploreService<B, C>
where
    B: Backend,
    C: BackendClient<B::Plan, B::Native>,
{
    pub fn new(backend: B, client: C, context: CompilerContext) -> Self {
        Self {
            backend,
            client,
            context,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn collection(&self) -> &CollectionReference {
        &self.context.collection
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn run(&self, plan: &B::Plan) -> ExploreResult<(B::Native, u64)> {
        let started = Instant::now();
        let native = self
            .client
            .execute(plan)
            .map_err(|e| e.with_context(&self.collection().collection_name))?;
        Ok((native, started.elapsed().as_millis() as u64))
    }

    fn check_page(&self, page: &Page) -> ExploreResult<()> {
        if page.size == 0 {
            return Err(ExploreError::invalid_parameter("'size' must be positive"));
        }
        if page.size > self.max_page_size {
            return Err(ExploreError::invalid_parameter(format!(
                "'size' must be at most {}",
                self.max_page_size
            )));
        }
        if page.from.saturating_add(page.size) > self.max_page_size {
            return Err(ExploreError::invalid_parameter(format!(
                "'from' + 'size' must be at most {}",
                self.max_page_size
            )));
        }
        Ok(())
    }

    /// Returns the plan and whether hits come back in reverse order
    fn compile_search(&self, request: &SearchRequest) -> ExploreResult<(B::Plan, bool)> {
        let page = &request.page;
        self.check_page(page)?;
        let cursor = page.cursor()?;

        let mut compiler = self.backend.compiler(self.context.clone());
        apply_filters(&mut compiler, &request.filter)?;
        compiler.filter_size(page.size, page.from);

        let reverse = matches!(cursor, Some((CursorDirection::Before, _)));
        if let Some(sort) = page.sort.as_deref().filter(|s| !s.trim().is_empty()) {
            // a `before` page is the `after` page of the inverted order
            let sort = if reverse {
                invert_sort(sort)?
            } else {
                sort.to_string()
            };
            compiler.sort(&sort)?;
            if let Some((_, values)) = cursor {
                compiler.search_after(&sort, values)?;
            }
        }
        Ok((compiler.build()?, reverse))
    }

    fn compile_aggregation(
        &self,
        request: &AggregationRequest,
    ) -> ExploreResult<(AggregationPlan, B::Plan)> {
        let plan = AggregationPlan::compile(
            &request.aggregations,
            &self.context.collection,
            self.context.resolver.as_ref(),
            request.geo,
        )?;
        let mut compiler = self.backend.compiler(self.context.clone());
        apply_filters(&mut compiler, &request.filter)?;
        compiler.aggregate(&plan)?;
        Ok((plan, compiler.build()?))
    }

    fn computations(&self) -> ComputationExecutor<'_, B, C> {
        ComputationExecutor::new(&self.backend, &self.client)
    }

    pub fn explain_search(&self, request: &SearchRequest) -> ExploreResult<B::Plan> {
        Ok(self.compile_search(request)?.0)
    }

    pub fn explain_aggregate(&self, request: &AggregationRequest) -> ExploreResult<B::Plan> {
        Ok(self.compile_aggregation(request)?.1)
    }

    pub fn explain_compute(&self, request: &ComputationRequest) -> ExploreResult<B::Plan> {
        self.computations().plan(&self.context, request)
    }

    /// Assembles hits returned for `request`
    pub fn assemble_search(&self, request: &SearchRequest, native: &B::Native) -> ExploreResult<Hits> {
        let reverse = matches!(request.page.cursor()?, Some((CursorDirection::Before, _)));
        self.backend
            .assembler(self.context.collection.clone())
            .assemble_hits(native, reverse)
    }

    /// Assembles the aggregation tree returned for `request`
    pub fn assemble_aggregate(
        &self,
        request: &AggregationRequest,
        native: &B::Native,
    ) -> ExploreResult<AggregationResponse> {
        let plan = AggregationPlan::compile(
            &request.aggregations,
            &self.context.collection,
            self.context.resolver.as_ref(),
            request.geo,
        )?;
        self.backend
            .assembler(self.context.collection.clone())
            .assemble_aggregation(native, &plan)
    }

    pub fn assemble_compute(
        &self,
        request: &ComputationRequest,
        native: &B::Native,
    ) -> ExploreResult<ComputationResponse> {
        self.computations().assemble(&self.context, request, native)
    }

    pub fn search(&self, request: &SearchRequest) -> ExploreResult<Hits> {
        let (plan, reverse) = self.compile_search(request)?;
        let (native, query_time) = self.run(&plan)?;
        let hits = self
            .backend
            .assembler(self.context.collection.clone())
            .assemble_hits(&native, reverse)?;
        debug!(
            backend = self.backend.name(),
            collection = %self.collection().collection_name,
            nbhits = hits.nbhits,
            totalnb = hits.totalnb,
            query_time,
            "search done"
        );
        Ok(hits)
    }

    pub fn aggregate(&self, request: &AggregationRequest) -> ExploreResult<AggregationResponse> {
        let (plan, native_plan) = self.compile_aggregation(request)?;
        let (native, query_time) = self.run(&native_plan)?;
        let mut response = self
            .backend
            .assembler(self.context.collection.clone())
            .assemble_aggregation(&native, &plan)?;
        response.query_time = Some(query_time);
        debug!(
            backend = self.backend.name(),
            collection = %self.collection().collection_name,
            levels = plan.depth(),
            buckets = response.elements.len(),
            query_time,
            "aggregation done"
        );
        Ok(response)
    }

    /// Runs `request` as a geo aggregation and renders its first-level
    /// buckets as a FeatureCollection
    pub fn geoaggregate(&self, request: &AggregationRequest) -> ExploreResult<Value> {
        let request = AggregationRequest {
            geo: true,
            ..request.clone()
        };
        Ok(self.aggregate(&request)?.to_feature_collection())
    }

    pub fn compute(&self, request: &ComputationRequest) -> ExploreResult<ComputationResponse> {
        self.computations().execute(&self.context, request)
    }
}
