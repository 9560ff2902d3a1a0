//! Document-search backend
//!
//! Compiles requests into a JSON query DSL (bool filters, bucket
//! aggregations, `top_hits`) and assembles the bucketed JSON it returns.
//! Supports every feature of the engine.

mod aggregations;
mod assembler;
mod compiler;
mod filters;

use std::sync::Arc;

use serde_json::Value;

pub use assembler::{lookup, SearchAssembler};
pub use compiler::{SearchCompiler, SearchPlan};

use crate::model::CollectionReference;
use crate::planner::{Backend, CompilerContext};

/// The document-search backend
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchBackend;

impl Backend for SearchBackend {
    type Plan = SearchPlan;
    type Native = Value;
    type Compiler = SearchCompiler;
    type Assembler = SearchAssembler;

    fn name(&self) -> &'static str {
        "search"
    }

    fn compiler(&self, context: CompilerContext) -> SearchCompiler {
        SearchCompiler::new(context)
    }

    fn assembler(&self, collection: Arc<CollectionReference>) -> SearchAssembler {
        SearchAssembler::new(collection)
    }
}
