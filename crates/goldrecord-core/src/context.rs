use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::{ProgressEvent, ProgressSink};
use crate::value::LeadRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationStatus {
    Ok,
    Skip,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub station: String,
    pub cost: f64,
    pub status: StationStatus,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// The mutable state threaded through one pipeline run. Stations read the
/// current lead data and budget via `&PipelineContext` and return a delta;
/// only the engine calls the mutating methods, after deciding (per the stop
/// condition) whether the delta should land.
#[derive(Debug)]
pub struct PipelineContext {
    data: Mutex<LeadRecord>,
    pub budget_limit: f64,
    total_cost: Mutex<f64>,
    history: Mutex<Vec<HistoryEntry>>,
    errors: Mutex<Vec<String>>,
    progress_sink: Option<Arc<dyn ProgressSink>>,
}

impl PipelineContext {
    pub fn new(data: LeadRecord, budget_limit: f64) -> Self {
        Self {
            data: Mutex::new(data),
            budget_limit,
            total_cost: Mutex::new(0.0),
            history: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            progress_sink: None,
        }
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    /// A snapshot of the lead record as it stands right now. Stations should
    /// treat this as read-only; mutation happens only via the delta they
    /// return from `process`.
    pub fn data(&self) -> LeadRecord {
        self.data.lock().expect("context data lock poisoned").clone()
    }

    pub fn total_cost(&self) -> f64 {
        *self.total_cost.lock().expect("context cost lock poisoned")
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().expect("context history lock poisoned").clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("context errors lock poisoned").clone()
    }

    pub fn has_budget_for(&self, cost_estimate: f64) -> bool {
        self.total_cost() + cost_estimate <= self.budget_limit
    }

    /// Merges `delta` into the working record and appends `cost` to the
    /// running total. Exposed for the pipeline engine to call; stations
    /// never call this directly — they return a delta and let the engine
    /// decide, per the stop condition, whether it lands.
    pub fn merge(&self, delta: LeadRecord, cost: f64) {
        self.data.lock().expect("context data lock poisoned").merge(delta);
        *self.total_cost.lock().expect("context cost lock poisoned") += cost;
    }

    pub fn push_history(&self, entry: HistoryEntry) {
        if let Some(err) = &entry.error {
            self.errors.lock().expect("context errors lock poisoned").push(err.clone());
        }
        self.history.lock().expect("context history lock poisoned").push(entry);
    }

    pub fn emit_progress(&self, event: ProgressEvent) {
        if let Some(sink) = &self.progress_sink {
            sink.emit(event);
        }
    }

    /// Consumes the context, producing the final lead record annotated with
    /// the pipeline summary fields every run attaches on exit.
    pub fn into_final_record(self) -> LeadRecord {
        let mut data = self.data.into_inner().expect("context data lock poisoned");
        let cost = *self.total_cost.lock().expect("context cost lock poisoned");
        let history = self.history.into_inner().expect("context history lock poisoned");
        let errors = self.errors.into_inner().expect("context errors lock poisoned");
        data.set("_pipeline_cost", cost);
        data.set("_pipeline_stations_executed", history.len() as f64);
        data.set("_pipeline_errors", errors.len() as f64);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_check_accounts_for_estimate() {
        let ctx = PipelineContext::new(LeadRecord::new(), 1.0);
        assert!(ctx.has_budget_for(1.0));
        assert!(!ctx.has_budget_for(1.01));
    }

    #[test]
    fn merge_accumulates_cost_and_data() {
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let mut delta = LeadRecord::new();
        delta.set("phone", "123");
        ctx.merge(delta, 0.5);
        assert_eq!(ctx.total_cost(), 0.5);
        assert_eq!(ctx.data().string("phone"), Some("123"));
    }

    #[test]
    fn final_record_carries_summary_fields() {
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        ctx.merge(LeadRecord::new(), 1.0);
        ctx.push_history(HistoryEntry {
            station: "a".into(),
            cost: 1.0,
            status: StationStatus::Ok,
            timestamp: Utc::now(),
            error: None,
        });
        let record = ctx.into_final_record();
        assert_eq!(record.get("_pipeline_cost").and_then(|v| v.as_f64()), Some(1.0));
        assert_eq!(
            record.get("_pipeline_stations_executed").and_then(|v| v.as_f64()),
            Some(1.0)
        );
    }
}
