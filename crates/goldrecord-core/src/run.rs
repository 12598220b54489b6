use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One progress update emitted as a station starts or finishes. Mirrors the
/// shape clients poll from the run registry and the shape streamed live over
/// the broadcast channel — both surfaces carry the same event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Running {
        step: usize,
        total: usize,
        pct: f64,
        station: String,
    },
    Substep {
        station: String,
        detail: serde_json::Value,
    },
    StationResult {
        station: String,
        status: StationOutcome,
        duration_ms: u64,
    },
    Final {
        success: bool,
        failure_mode: Option<FailureMode>,
        failure_at: Option<String>,
        hint: Option<String>,
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationOutcome {
    Ok,
    Skip,
    Fail,
}

/// A sink for progress events. Implemented by the run registry (to mirror
/// into the per-run hash) and by a broadcast-channel adapter (for live NDJSON
/// subscribers); the pipeline and stations only ever see this trait object,
/// never a concrete channel type.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Why a run failed, inferred from its substep history. See
/// `goldrecord-worker`'s run registry for the inference rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    Mapping,
    Selector,
    Captcha,
    CoreTimeout,
    CoreResult,
    Downstream,
    Unknown,
    Empty,
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Done,
    Error,
}

/// The record mirrored at `enrich:run:{run_id}`, polled by clients that
/// can't hold an open stream connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub status: RunStatus,
    pub progress: Option<ProgressEvent>,
    pub result: Option<ProgressEvent>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new_running(now: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Running,
            progress: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
