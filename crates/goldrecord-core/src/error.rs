use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A structured failure raised by a station, carrying enough detail for an
/// operator to act on without reading logs: which step failed, why, and
/// (when known) what would fix it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredPipelineError {
    pub step: String,
    pub reason: String,
    pub suggested_fix: Option<String>,
}

impl StructuredPipelineError {
    pub fn new(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            reason: reason.into(),
            suggested_fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

impl std::fmt::Display for StructuredPipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.step, self.reason)
    }
}

/// Crate-boundary error type for anything a station or the engine can raise.
/// Variants map onto the failure taxonomy stations are expected to report;
/// `Structured` is the escape hatch for a station-specific reason + fix hint.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("missing prerequisite input: {0}")]
    MissingPrerequisite(String),

    #[error("budget exhausted: cost {cost} + estimate {estimate} exceeds limit {limit}")]
    BudgetExhausted { cost: f64, estimate: f64, limit: f64 },

    #[error("provider {provider} timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    #[error("provider {provider} reported failure: {reason}")]
    ProviderFailed { provider: String, reason: String },

    #[error("could not parse provider reply: {0}")]
    ParseError(String),

    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    #[error("station failed: {0}")]
    TerminalStationError(String),

    #[error("{0}")]
    Structured(StructuredPipelineError),
}

impl EnrichError {
    /// Whether retrying the same operation (generally: trying the next
    /// provider) has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrichError::ProviderTimeout { .. }
                | EnrichError::ProviderFailed { .. }
                | EnrichError::ParseError(_)
        )
    }

    /// The reason text regardless of variant, used when appending a history
    /// entry — every failure needs a one-line explanation.
    pub fn reason(&self) -> String {
        match self {
            EnrichError::Structured(s) => s.reason.clone(),
            other => other.to_string(),
        }
    }

    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            EnrichError::Structured(s) => s.suggested_fix.clone(),
            _ => None,
        }
    }
}

impl From<StructuredPipelineError> for EnrichError {
    fn from(value: StructuredPipelineError) -> Self {
        EnrichError::Structured(value)
    }
}
