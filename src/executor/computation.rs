//! Single-value computations
//!
//! A computation is a bucket-less query: the filtered set is reduced to one
//! scalar, a max-min pair for `spanning`, or a geometry for `geobbox` and
//! `geocentroid`. No matching row yields a null value.

use std::time::Instant;

use tracing::debug;

use super::filters::apply_filters;
use crate::errors::ExploreResult;
use crate::model::{ComputationRequest, ComputationResponse};
use crate::planner::{Backend, BackendClient, CompilerContext, QueryCompiler, ResultAssembler};

/// Compiles, runs and assembles computations against one backend
pub struct ComputationExecutor<'a, B: Backend, C> {
    backend: &'a B,
    client: &'a C,
}

impl<'a, B, C> ComputationExecutor<'a, B, C>
where
    B: Backend,
    C: BackendClient<B::Plan, B::Native>,
{
    pub fn new(backend: &'a B, client: &'a C) -> Self {
        Self { backend, client }
    }

    /// Compiles the plan of a computation without running it
    pub fn plan(&self, context: &CompilerContext, request: &ComputationRequest) -> ExploreResult<B::Plan> {
        let mut compiler = self.backend.compiler(context.clone());
        apply_filters(&mut compiler, &request.filter)?;
        compiler.compute(&request.field, request.metric)?;
        compiler.build()
    }

    /// Assembles a native result; query time is left at 0
    pub fn assemble(
        &self,
        context: &CompilerContext,
        request: &ComputationRequest,
        native: &B::Native,
    ) -> ExploreResult<ComputationResponse> {
        self.backend
            .assembler(context.collection.clone())
            .assemble_computation(native, request.field.trim(), request.metric)
    }

    pub fn execute(
        &self,
        context: &CompilerContext,
        request: &ComputationRequest,
    ) -> ExploreResult<ComputationResponse> {
        let plan = self.plan(context, request)?;

        let started = Instant::now();
        let native = self
            .client
            .execute(&plan)
            .map_err(|e| e.with_context(&context.collection.collection_name))?;
        let query_time = started.elapsed().as_millis() as u64;

        let mut response = self.assemble(context, request, &native)?;
        response.query_time = query_time;
        debug!(
            backend = self.backend.name(),
            field = %response.field,
            metric = response.metric.as_str(),
            totalnb = response.totalnb,
            query_time,
            "computation done"
        );
        Ok(response)
    }
}
