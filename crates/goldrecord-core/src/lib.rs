//! Core types shared by every Golden Record crate: the lead record model,
//! pipeline context, the station contract, wire formats for missions and
//! background runs, and the crate-boundary error taxonomy.

mod context;
mod error;
mod health;
mod mission;
mod run;
mod station;
mod value;

pub use context::{HistoryEntry, PipelineContext, StationStatus};
pub use error::{EnrichError, StructuredPipelineError};
pub use health::HealthSnapshot;
pub use mission::{Mission, MissionResult, MissionStatus};
pub use run::{FailureMode, ProgressEvent, ProgressSink, RunRecord, RunStatus, StationOutcome};
pub use station::{DynStation, FailureDetail, Station, StopCondition};
pub use value::{LeadRecord, LeadValue};
