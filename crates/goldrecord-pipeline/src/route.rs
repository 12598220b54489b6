use std::collections::HashSet;
use std::sync::Arc;

use goldrecord_core::DynStation;

use crate::error::PipelineError;

/// Checks a route is sane before handing it to [`crate::run_pipeline`]: not
/// empty, and no two stations sharing a name (duplicate names would make
/// history entries and progress events ambiguous to attribute).
pub fn validate_route(route: &[Arc<dyn DynStation>]) -> Result<(), PipelineError> {
    if route.is_empty() {
        return Err(PipelineError::EmptyRoute);
    }
    let mut seen = HashSet::new();
    for station in route {
        if !seen.insert(station.name().to_string()) {
            return Err(PipelineError::DuplicateStation(station.name().to_string()));
        }
    }
    Ok(())
}
