//! The sequential station executor: prerequisite gate, budget gate, invoke,
//! merge-on-success, progress events.

mod engine;
mod error;
mod route;

pub use engine::{run_pipeline, PipelineOutcome};
pub use error::PipelineError;
pub use route::validate_route;
