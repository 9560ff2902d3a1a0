//! Relational backend
//!
//! Compiles requests to parameterised SQL over a spatially-enabled
//! database. Geometries are stored in SRID 4326 and dates as epoch
//! milliseconds. Raw geometries and per-bucket hits are not supported.

mod aggregations;
mod assembler;
mod compiler;
mod predicate;
mod writer;

use std::sync::Arc;

pub use assembler::{Row, SqlAssembler, SqlRows};
pub use compiler::{
    level_statement_name, sort_column, SqlCompiler, SqlPlan, SqlStatement, CENTROID_COLUMN,
    COMPUTATION_STATEMENT, COUNT_STATEMENT, GEOMETRY_COLUMN, HITS_STATEMENT,
};
pub use writer::quote;

use crate::model::CollectionReference;
use crate::planner::{Backend, CompilerContext};

/// Relational backend
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBackend;

impl Backend for SqlBackend {
    type Plan = SqlPlan;
    type Native = SqlRows;
    type Compiler = SqlCompiler;
    type Assembler = SqlAssembler;

    fn name(&self) -> &'static str {
        "sql"
    }

    fn compiler(&self, context: CompilerContext) -> SqlCompiler {
        SqlCompiler::new(context)
    }

    fn assembler(&self, collection: Arc<CollectionReference>) -> SqlAssembler {
        SqlAssembler::new(collection)
    }
}
