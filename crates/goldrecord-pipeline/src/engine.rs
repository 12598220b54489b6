use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use goldrecord_core::{
    DynStation, HistoryEntry, LeadRecord, LeadValue, PipelineContext, ProgressEvent, StationOutcome,
    StationStatus, StopCondition,
};
use tracing::{instrument, warn};

/// Everything the engine learned about a finished run. `history`/`errors`
/// are captured before the context is consumed so callers (the worker's run
/// registry, in particular) can still inspect them for failure-mode
/// inference after `data` has absorbed the `_pipeline_*` summary fields.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub data: LeadRecord,
    pub total_cost: f64,
    pub history: Vec<HistoryEntry>,
    pub errors: Vec<String>,
    pub stations_executed: usize,
    pub error_count: usize,
    /// Set when the run terminated early because a station's cost estimate
    /// would have exceeded the budget — the only condition that aborts the
    /// remaining route rather than simply failing one station.
    pub budget_exhausted: bool,
}

enum StationRunResult {
    Continue(LeadRecord),
    SkipRemaining(LeadRecord),
    Fail { reason: String, suggested_fix: Option<String> },
}

/// Runs `route` against `ctx` to completion: prerequisite gate, budget gate,
/// invoke, merge-on-success, progress events.
/// Station failures never abort the run; only a budget-exhausted gate does.
/// Call [`crate::validate_route`] first if the route isn't known-good (e.g.
/// built from configuration) — this function assumes it already is.
pub async fn run_pipeline(
    ctx: PipelineContext,
    route: &[Arc<dyn DynStation>],
    step_timeout: Option<Duration>,
) -> PipelineOutcome {
    seed_working_name(&ctx);

    let total = route.len();
    let mut budget_exhausted = false;

    for (index, station) in route.iter().enumerate() {
        let step = index + 1;
        ctx.emit_progress(ProgressEvent::Running {
            step,
            total,
            pct: step as f64 / total.max(1) as f64 * 100.0,
            station: station.name().to_string(),
        });

        if let Some(missing) = first_missing_prerequisite(&ctx, station.as_ref()) {
            record_fail(&ctx, station.as_ref(), 0.0, format!("missing prerequisite: {missing}"), None);
            continue;
        }

        let estimate = station.cost_estimate();
        if !ctx.has_budget_for(estimate) {
            record_fail(
                &ctx,
                station.as_ref(),
                0.0,
                format!(
                    "budget exhausted: cost {:.4} + estimate {estimate:.4} exceeds limit {:.4}",
                    ctx.total_cost(),
                    ctx.budget_limit
                ),
                None,
            );
            budget_exhausted = true;
            break;
        }

        let start = Instant::now();
        let result = run_station(station.as_ref(), &ctx, step_timeout).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            StationRunResult::Continue(delta) => {
                ctx.merge(delta, estimate);
                push_history(&ctx, station.as_ref(), estimate, StationStatus::Ok, None);
                emit_result(&ctx, station.as_ref(), StationOutcome::Ok, duration_ms);
            }
            StationRunResult::SkipRemaining(delta) => {
                ctx.merge(delta, estimate);
                push_history(&ctx, station.as_ref(), estimate, StationStatus::Skip, None);
                emit_result(&ctx, station.as_ref(), StationOutcome::Skip, duration_ms);
                break;
            }
            StationRunResult::Fail { reason, suggested_fix } => {
                if let Some(fix) = &suggested_fix {
                    warn!(station = station.name(), reason, fix, "station reported structured failure");
                }
                push_history(&ctx, station.as_ref(), estimate, StationStatus::Fail, Some(reason));
                emit_result(&ctx, station.as_ref(), StationOutcome::Fail, duration_ms);
            }
        }
    }

    let history = ctx.history();
    let errors = ctx.errors();
    let total_cost = ctx.total_cost();
    let stations_executed = history.len();
    let error_count = errors.len();
    let data = ctx.into_final_record();

    // The engine deliberately does not emit a `ProgressEvent::Final` itself:
    // failure-mode inference needs the full substep history plus knowledge
    // of which station is Chimera/Identity/etc, which lives in
    // `goldrecord-worker`. It builds the enriched `Final` event from this
    // `PipelineOutcome` and is the single source of truth for what lands in
    // the run registry and the live NDJSON stream.

    PipelineOutcome {
        data,
        total_cost,
        history,
        errors,
        stations_executed,
        error_count,
        budget_exhausted,
    }
}

#[instrument(skip(ctx), fields(station = station.name()))]
async fn run_station(
    station: &dyn DynStation,
    ctx: &PipelineContext,
    step_timeout: Option<Duration>,
) -> StationRunResult {
    let attempt = AssertUnwindSafe(station.process(ctx)).catch_unwind();
    let outcome = match step_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, attempt).await {
            Ok(inner) => inner,
            Err(_) => {
                return StationRunResult::Fail {
                    reason: format!("station timed out after {timeout:?}"),
                    suggested_fix: None,
                };
            }
        },
        None => attempt.await,
    };

    match outcome {
        Ok(Ok((delta, StopCondition::Continue))) => StationRunResult::Continue(delta),
        Ok(Ok((delta, StopCondition::SkipRemaining))) => StationRunResult::SkipRemaining(delta),
        Ok(Ok((_, StopCondition::Fail(detail)))) => StationRunResult::Fail {
            reason: detail.reason,
            suggested_fix: detail.suggested_fix,
        },
        Ok(Err(err)) => StationRunResult::Fail {
            reason: err.reason(),
            suggested_fix: err.suggested_fix(),
        },
        Err(panic) => StationRunResult::Fail {
            reason: panic_message(&panic),
            suggested_fix: None,
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "station panicked".to_string()
    }
}

fn seed_working_name(ctx: &PipelineContext) {
    let data = ctx.data();
    if data.get("name").is_none()
        && let Some(name) = data.name()
    {
        let mut delta = LeadRecord::new();
        delta.set("name", name);
        ctx.merge(delta, 0.0);
    }
}

fn first_missing_prerequisite(ctx: &PipelineContext, station: &dyn DynStation) -> Option<String> {
    let data = ctx.data();
    station
        .required_inputs()
        .iter()
        .find(|key| !is_present(&data, key))
        .map(|key| (*key).to_string())
}

fn is_present(data: &LeadRecord, key: &str) -> bool {
    match data.get(key) {
        None => false,
        Some(LeadValue::Json(serde_json::Value::Null)) => false,
        Some(_) => true,
    }
}

fn push_history(
    ctx: &PipelineContext,
    station: &dyn DynStation,
    cost: f64,
    status: StationStatus,
    error: Option<String>,
) {
    ctx.push_history(HistoryEntry {
        station: station.name().to_string(),
        cost,
        status,
        timestamp: Utc::now(),
        error,
    });
}

fn emit_result(ctx: &PipelineContext, station: &dyn DynStation, status: StationOutcome, duration_ms: u64) {
    ctx.emit_progress(ProgressEvent::StationResult {
        station: station.name().to_string(),
        status,
        duration_ms,
    });
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc as StdArc, Mutex};

    use async_trait::async_trait;
    use goldrecord_core::{EnrichError, ProgressSink};

    use super::*;

    struct FixedStation {
        name: &'static str,
        required: Vec<&'static str>,
        cost: f64,
        outcome: fn() -> Result<(LeadRecord, StopCondition), EnrichError>,
    }

    #[async_trait]
    impl DynStation for FixedStation {
        fn name(&self) -> &str {
            self.name
        }
        fn required_inputs(&self) -> &[&str] {
            &self.required
        }
        fn produces_outputs(&self) -> &[&str] {
            &[]
        }
        fn cost_estimate(&self) -> f64 {
            self.cost
        }
        async fn process(&self, _ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
            (self.outcome)()
        }
    }

    fn continue_with(key: &'static str, value: &'static str) -> impl Fn() -> Result<(LeadRecord, StopCondition), EnrichError> {
        move || {
            let mut delta = LeadRecord::new();
            delta.set(key, value);
            Ok((delta, StopCondition::Continue))
        }
    }

    #[tokio::test]
    async fn happy_route_accumulates_cost_and_history() {
        let mut lead = LeadRecord::new();
        lead.set("name", "John Doe");
        let ctx = PipelineContext::new(lead, 5.0);
        let route: Vec<StdArc<dyn DynStation>> = vec![StdArc::new(FixedStation {
            name: "identity",
            required: vec![],
            cost: 0.05,
            outcome: || Ok((LeadRecord::new(), StopCondition::Continue)),
        })];
        let outcome = run_pipeline(ctx, &route, None).await;
        assert_eq!(outcome.stations_executed, 1);
        assert_eq!(outcome.error_count, 0);
        assert!((outcome.total_cost - 0.05).abs() < 1e-9);
        assert!(!outcome.budget_exhausted);
    }

    #[tokio::test]
    async fn missing_prerequisite_does_not_mutate_data() {
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let route: Vec<StdArc<dyn DynStation>> = vec![StdArc::new(FixedStation {
            name: "needs-phone",
            required: vec!["phone"],
            cost: 0.10,
            outcome: continue_with("phone", "+15551234567"),
        }) as StdArc<dyn DynStation>];
        let outcome = run_pipeline(ctx, &route, None).await;
        assert_eq!(outcome.stations_executed, 1);
        assert_eq!(outcome.error_count, 1);
        assert!(outcome.data.get("phone").is_none());
        assert!((outcome.total_cost).abs() < 1e-9);
    }

    #[tokio::test]
    async fn budget_exhaustion_terminates_remaining_route() {
        let ctx = PipelineContext::new(LeadRecord::new(), 0.10);
        let route: Vec<StdArc<dyn DynStation>> = vec![
            StdArc::new(FixedStation {
                name: "identity",
                required: vec![],
                cost: 0.00,
                outcome: || Ok((LeadRecord::new(), StopCondition::Continue)),
            }) as StdArc<dyn DynStation>,
            StdArc::new(FixedStation {
                name: "chimera",
                required: vec![],
                cost: 0.05,
                outcome: || Ok((LeadRecord::new(), StopCondition::Continue)),
            }) as StdArc<dyn DynStation>,
            StdArc::new(FixedStation {
                name: "skip-tracing",
                required: vec![],
                cost: 0.15,
                outcome: || Ok((LeadRecord::new(), StopCondition::Continue)),
            }) as StdArc<dyn DynStation>,
        ];
        let outcome = run_pipeline(ctx, &route, None).await;
        assert_eq!(outcome.stations_executed, 2);
        assert!(outcome.budget_exhausted);
        assert!(outcome.total_cost <= 0.10 + 1e-9);
        assert!(outcome.errors.iter().any(|e| e.contains("budget exhausted")));
    }

    #[tokio::test]
    async fn skip_remaining_halts_subsequent_stations() {
        let never_ran = StdArc::new(Mutex::new(false));
        let never_ran_flag = never_ran.clone();

        struct FlagStation(StdArc<Mutex<bool>>);
        #[async_trait]
        impl DynStation for FlagStation {
            fn name(&self) -> &str {
                "downstream"
            }
            fn required_inputs(&self) -> &[&str] {
                &[]
            }
            fn produces_outputs(&self) -> &[&str] {
                &[]
            }
            fn cost_estimate(&self) -> f64 {
                0.0
            }
            async fn process(&self, _ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
                *self.0.lock().unwrap() = true;
                Ok((LeadRecord::new(), StopCondition::Continue))
            }
        }

        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let route: Vec<StdArc<dyn DynStation>> = vec![
            StdArc::new(FixedStation {
                name: "gatekeep",
                required: vec![],
                cost: 0.0,
                outcome: || Ok((LeadRecord::new(), StopCondition::SkipRemaining)),
            }) as StdArc<dyn DynStation>,
            StdArc::new(FlagStation(never_ran_flag)) as StdArc<dyn DynStation>,
        ];
        let outcome = run_pipeline(ctx, &route, None).await;
        assert_eq!(outcome.stations_executed, 1);
        assert!(!*never_ran.lock().unwrap());
    }

    #[tokio::test]
    async fn structured_error_is_captured_as_fail_and_run_continues() {
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let route: Vec<StdArc<dyn DynStation>> = vec![
            StdArc::new(FixedStation {
                name: "flaky",
                required: vec![],
                cost: 0.0,
                outcome: || {
                    Err(EnrichError::from(goldrecord_core::StructuredPipelineError::new(
                        "flaky",
                        "boom",
                    )))
                },
            }) as StdArc<dyn DynStation>,
            StdArc::new(FixedStation {
                name: "after",
                required: vec![],
                cost: 0.0,
                outcome: || Ok((LeadRecord::new(), StopCondition::Continue)),
            }) as StdArc<dyn DynStation>,
        ];
        let outcome = run_pipeline(ctx, &route, None).await;
        assert_eq!(outcome.stations_executed, 2);
        assert_eq!(outcome.error_count, 1);
        assert_eq!(outcome.history[0].status, StationStatus::Fail);
        assert_eq!(outcome.history[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn station_panic_is_captured_not_propagated() {
        struct PanicStation;
        #[async_trait]
        impl DynStation for PanicStation {
            fn name(&self) -> &str {
                "panics"
            }
            fn required_inputs(&self) -> &[&str] {
                &[]
            }
            fn produces_outputs(&self) -> &[&str] {
                &[]
            }
            fn cost_estimate(&self) -> f64 {
                0.0
            }
            async fn process(&self, _ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
                panic!("unexpected");
            }
        }
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let route: Vec<StdArc<dyn DynStation>> = vec![StdArc::new(PanicStation) as StdArc<dyn DynStation>];
        let outcome = run_pipeline(ctx, &route, None).await;
        assert_eq!(outcome.error_count, 1);
        assert_eq!(outcome.history[0].status, StationStatus::Fail);
    }

    #[tokio::test]
    async fn per_station_timeout_is_recorded_as_failure() {
        struct SlowStation;
        #[async_trait]
        impl DynStation for SlowStation {
            fn name(&self) -> &str {
                "slow"
            }
            fn required_inputs(&self) -> &[&str] {
                &[]
            }
            fn produces_outputs(&self) -> &[&str] {
                &[]
            }
            fn cost_estimate(&self) -> f64 {
                0.0
            }
            async fn process(&self, _ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok((LeadRecord::new(), StopCondition::Continue))
            }
        }
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let route: Vec<StdArc<dyn DynStation>> = vec![StdArc::new(SlowStation) as StdArc<dyn DynStation>];
        let outcome = run_pipeline(ctx, &route, Some(Duration::from_millis(20))).await;
        assert_eq!(outcome.history[0].status, StationStatus::Fail);
        assert!(outcome.history[0].error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn progress_sink_receives_running_and_result_events() {
        struct CollectSink(StdArc<Mutex<Vec<ProgressEvent>>>);
        impl ProgressSink for CollectSink {
            fn emit(&self, event: ProgressEvent) {
                self.0.lock().unwrap().push(event);
            }
        }

        let events = StdArc::new(Mutex::new(Vec::new()));
        let sink = StdArc::new(CollectSink(events.clone()));
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0).with_progress_sink(sink);
        let route: Vec<StdArc<dyn DynStation>> = vec![StdArc::new(FixedStation {
            name: "identity",
            required: vec![],
            cost: 0.0,
            outcome: || Ok((LeadRecord::new(), StopCondition::Continue)),
        }) as StdArc<dyn DynStation>];
        run_pipeline(ctx, &route, None).await;
        let collected = events.lock().unwrap();
        assert!(collected.iter().any(|e| matches!(e, ProgressEvent::Running { .. })));
        assert!(collected.iter().any(|e| matches!(e, ProgressEvent::StationResult { .. })));
    }
}
