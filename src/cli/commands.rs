//! CLI command implementations
//!
//! Both commands work offline: `explain` prints the plan a request compiles
//! to, `assemble` turns a result obtained from the backend by other means
//! into the response the engine would return.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{BackendKind, CollectionConfig, EngineConfig};
use crate::errors::{ExploreError, ExploreResult};
use crate::executor::ExploreService;
use crate::model::ExploreRequest;
use crate::planner::{Backend, BackendClient};
use crate::search::SearchBackend;
use crate::sql::SqlBackend;

use super::args::{Command, Target};
use super::errors::CliResult;
use super::io::{read_request, write_error, write_response};

/// Input of the `assemble` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembleInput {
    pub request: ExploreRequest,
    /// Native result returned by the backend for `request`
    pub result: Value,
}

/// Client of a backend that is never called
struct Offline;

impl<P, N> BackendClient<P, N> for Offline {
    fn execute(&self, _plan: &P) -> ExploreResult<N> {
        Err(ExploreError::backend("no backend client in offline mode"))
    }
}

fn service<B: Backend>(
    backend: B,
    config: &EngineConfig,
    collection: &CollectionConfig,
) -> ExploreService<B, Offline> {
    ExploreService::new(backend, Offline, collection.context())
        .with_max_page_size(config.max_page_size)
}

/// Run a CLI command, writing its response or error to stdout
pub fn run_command(command: Command) -> CliResult<()> {
    let result = match command {
        Command::Explain { target } => read_request().and_then(|request| {
            let config = EngineConfig::load(&target.config)?;
            explain(&config, &target.collection, backend_kind(&target, &config), &request)
        }),
        Command::Assemble { target } => read_request().and_then(|input| {
            let config = EngineConfig::load(&target.config)?;
            assemble(&config, &target.collection, backend_kind(&target, &config), &input)
        }),
    };

    match result {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code(), &e.message())?;
            Err(e)
        }
    }
}

fn backend_kind(target: &Target, config: &EngineConfig) -> BackendKind {
    target.backend.unwrap_or(config.backend)
}

/// Compiles `request` and returns the plan
pub fn explain(
    config: &EngineConfig,
    collection: &str,
    backend: BackendKind,
    request: &ExploreRequest,
) -> CliResult<Value> {
    let collection = config.collection(collection)?;
    match backend {
        BackendKind::Search => explain_with(&service(SearchBackend, config, collection), request),
        BackendKind::Sql => explain_with(&service(SqlBackend, config, collection), request),
    }
}

fn explain_with<B: Backend>(
    service: &ExploreService<B, Offline>,
    request: &ExploreRequest,
) -> CliResult<Value> {
    let plan = match request {
        ExploreRequest::Search(r) => service.explain_search(r)?,
        ExploreRequest::Aggregate(r) => service.explain_aggregate(r)?,
        ExploreRequest::Compute(r) => service.explain_compute(r)?,
    };
    debug!(backend = service.backend_name(), plan = ?plan, "compiled plan");
    Ok(serde_json::to_value(&plan)?)
}

/// Assembles the native result of `input` into the response
pub fn assemble(
    config: &EngineConfig,
    collection: &str,
    backend: BackendKind,
    input: &AssembleInput,
) -> CliResult<Value> {
    let collection = config.collection(collection)?;
    match backend {
        BackendKind::Search => assemble_with(&service(SearchBackend, config, collection), input),
        BackendKind::Sql => assemble_with(&service(SqlBackend, config, collection), input),
    }
}

fn assemble_with<B: Backend>(
    service: &ExploreService<B, Offline>,
    input: &AssembleInput,
) -> CliResult<Value> {
    let native: B::Native = serde_json::from_value(input.result.clone())?;
    let response = match &input.request {
        ExploreRequest::Search(r) => serde_json::to_value(service.assemble_search(r, &native)?)?,
        ExploreRequest::Aggregate(r) if r.geo => {
            service.assemble_aggregate(r, &native)?.to_feature_collection()
        }
        ExploreRequest::Aggregate(r) => {
            serde_json::to_value(service.assemble_aggregate(r, &native)?)?
        }
        ExploreRequest::Compute(r) => serde_json::to_value(service.assemble_compute(r, &native)?)?,
    };
    Ok(response)
}
