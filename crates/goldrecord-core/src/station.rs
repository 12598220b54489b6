use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::PipelineContext;
use crate::error::{EnrichError, StructuredPipelineError};
use crate::value::LeadRecord;

/// What a station wants the engine to do after `process` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StopCondition {
    /// Merge the delta and continue to the next station.
    Continue,
    /// Merge the delta and end the run successfully; no further stations run.
    SkipRemaining,
    /// Do not merge the delta; record the failure and continue to the next
    /// station (this is not fatal to the run — only budget exhaustion is).
    Fail(FailureDetail),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub reason: String,
    pub suggested_fix: Option<String>,
}

impl FailureDetail {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            suggested_fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

impl From<StructuredPipelineError> for FailureDetail {
    fn from(value: StructuredPipelineError) -> Self {
        Self {
            reason: value.reason,
            suggested_fix: value.suggested_fix,
        }
    }
}

/// A single stage of the pipeline. Implemented directly as a native `async
/// fn` trait (no boxed futures on the hot path); [`DynStation`] below is the
/// object-safe counterpart used by the engine, which only ever holds a route
/// as `Vec<Arc<dyn DynStation>>`.
pub trait Station: Send + Sync {
    fn name(&self) -> &str;
    fn required_inputs(&self) -> &[&str];
    fn produces_outputs(&self) -> &[&str];
    fn cost_estimate(&self) -> f64;

    /// Runs the station against the current context. Returning `Err` records
    /// an untyped failure (the raw error text) into history and continues;
    /// returning `Ok((_, StopCondition::Fail(detail)))` is the structured
    /// equivalent and is the preferred path for expected failure modes.
    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError>;
}

/// Object-safe counterpart of [`Station`], obtained for free via the blanket
/// impl below. The pipeline engine is generic over `dyn DynStation` so routes
/// can mix station implementations without monomorphizing per-route.
#[async_trait]
pub trait DynStation: Send + Sync {
    fn name(&self) -> &str;
    fn required_inputs(&self) -> &[&str];
    fn produces_outputs(&self) -> &[&str];
    fn cost_estimate(&self) -> f64;
    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError>;
}

#[async_trait]
impl<T> DynStation for T
where
    T: Station + Sync,
{
    fn name(&self) -> &str {
        Station::name(self)
    }

    fn required_inputs(&self) -> &[&str] {
        Station::required_inputs(self)
    }

    fn produces_outputs(&self) -> &[&str] {
        Station::produces_outputs(self)
    }

    fn cost_estimate(&self) -> f64 {
        Station::cost_estimate(self)
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        Station::process(self, ctx).await
    }
}
