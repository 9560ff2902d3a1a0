//! Filter application shared by every request kind

use crate::errors::ExploreResult;
use crate::model::FilterRequest;
use crate::planner::QueryCompiler;

/// Adds every `f` and `q` group of `filter` to `compiler`, in order
pub fn apply_filters<Q: QueryCompiler>(compiler: &mut Q, filter: &FilterRequest) -> ExploreResult<()> {
    let date_format = filter.date_format.as_deref();
    for group in &filter.f {
        compiler.filter(group, date_format)?;
    }
    for group in &filter.q {
        compiler.filter_q(group)?;
    }
    Ok(())
}
