use thiserror::Error;

/// Crate-boundary error type. `run_pipeline` itself never fails — station
/// failures are non-fatal by design — so the only thing that can go wrong at
/// this layer is a malformed route handed to the engine before a single
/// station has executed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("duplicate station name in route: {0}")]
    DuplicateStation(String),

    #[error("route is empty")]
    EmptyRoute,
}
