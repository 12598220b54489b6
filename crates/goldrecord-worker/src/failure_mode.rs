use goldrecord_core::{FailureMode, HistoryEntry, ProgressEvent, StationStatus};
use goldrecord_pipeline::PipelineOutcome;

const CHIMERA_STATION: &str = "Chimera Mission Dispatcher";
const BLUEPRINT_STATION: &str = "Blueprint Loader";

/// Builds the `ProgressEvent::Final` event landing in both the run registry
/// and the live NDJSON stream: success flag plus, on failure, the
/// `failure_mode`/`failure_at`/`hint` triple. The pipeline
/// engine itself doesn't know which station is Chimera or Blueprint Loader —
/// that naming lives here, the single place that turns raw history into an
/// operator-facing diagnosis.
pub fn build_final_event(outcome: &PipelineOutcome) -> ProgressEvent {
    let data = outcome.data.to_json();
    let has_phone = outcome.data.string("phone").is_some_and(|p| !p.is_empty());
    let success = has_phone && !outcome.budget_exhausted;

    if success {
        return ProgressEvent::Final { success: true, failure_mode: None, failure_at: None, hint: None, data };
    }

    let (failure_mode, failure_at, hint) = if outcome.budget_exhausted {
        (
            FailureMode::Startup,
            last_fail_station(&outcome.history),
            "increase PIPELINE_BUDGET_LIMIT or shorten the route for this lead".to_string(),
        )
    } else if let Some(mode) = infer_failure_mode(&outcome.history) {
        (mode, last_fail_station(&outcome.history), hint_for(mode).to_string())
    } else {
        (
            FailureMode::Empty,
            None,
            "no station produced a phone; verify the lead carries enough identity to route".to_string(),
        )
    };

    ProgressEvent::Final {
        success: false,
        failure_mode: Some(failure_mode),
        failure_at,
        hint: Some(hint),
        data,
    }
}

/// Classifies the run's most recent failed station into one of the
/// `failure_mode` buckets. Returns `None` when no station actually failed
/// (the run simply never produced a phone — callers fold that into `Empty`).
pub fn infer_failure_mode(history: &[HistoryEntry]) -> Option<FailureMode> {
    let last_fail = history.iter().rev().find(|h| h.status == StationStatus::Fail)?;
    let reason = last_fail.error.as_deref().unwrap_or_default().to_lowercase();

    let mode = if last_fail.station == BLUEPRINT_STATION || reason.contains("mapping") {
        FailureMode::Mapping
    } else if reason.contains("selector") {
        FailureMode::Selector
    } else if reason.contains("captcha") {
        FailureMode::Captcha
    } else if last_fail.station == CHIMERA_STATION && (reason.contains("timed out") || reason.contains("timeout")) {
        FailureMode::CoreTimeout
    } else if last_fail.station == CHIMERA_STATION {
        FailureMode::CoreResult
    } else if !reason.is_empty() {
        FailureMode::Downstream
    } else {
        FailureMode::Unknown
    };
    Some(mode)
}

fn last_fail_station(history: &[HistoryEntry]) -> Option<String> {
    history.iter().rev().find(|h| h.status == StationStatus::Fail).map(|h| h.station.clone())
}

fn hint_for(mode: FailureMode) -> &'static str {
    match mode {
        FailureMode::Mapping => "domain has no selector blueprint; publish one or wait for auto-mapping",
        FailureMode::Selector => "a known selector broke against the live page; re-map the domain",
        FailureMode::Captcha => "captcha solving failed upstream; retry or rotate proxies",
        FailureMode::CoreTimeout => "worker fleet did not reply in time; check worker health and queue depth",
        FailureMode::CoreResult => "worker fleet reported an explicit failure for this mission",
        FailureMode::Downstream => "a downstream validation/enrichment station failed after Chimera",
        FailureMode::Unknown => "failure could not be attributed to a known cause; check station logs",
        FailureMode::Empty => "no station produced a phone; verify the lead carries enough identity to route",
        FailureMode::Startup => "run terminated before completing the route (budget exhausted or startup error)",
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use goldrecord_core::LeadRecord;

    use super::*;

    fn entry(station: &str, status: StationStatus, error: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            station: station.to_string(),
            cost: 0.0,
            status,
            timestamp: Utc::now(),
            error: error.map(str::to_string),
        }
    }

    fn outcome_with(history: Vec<HistoryEntry>, data: LeadRecord, budget_exhausted: bool) -> PipelineOutcome {
        let error_count = history.iter().filter(|h| h.status == StationStatus::Fail).count();
        PipelineOutcome {
            total_cost: 0.0,
            stations_executed: history.len(),
            error_count,
            errors: Vec::new(),
            history,
            data,
            budget_exhausted,
        }
    }

    #[test]
    fn successful_run_has_no_failure_mode() {
        let mut data = LeadRecord::new();
        data.set("phone", "+15551234567");
        let outcome = outcome_with(vec![entry("Chimera Mission Dispatcher", StationStatus::Ok, None)], data, false);
        let event = build_final_event(&outcome);
        assert!(matches!(event, ProgressEvent::Final { success: true, failure_mode: None, .. }));
    }

    #[test]
    fn mission_timeout_maps_to_core_timeout() {
        let history = vec![entry(CHIMERA_STATION, StationStatus::Fail, Some("provider timed out after 120s"))];
        assert_eq!(infer_failure_mode(&history), Some(FailureMode::CoreTimeout));
    }

    #[test]
    fn blueprint_failure_maps_to_mapping() {
        let history = vec![entry(BLUEPRINT_STATION, StationStatus::Fail, Some("missing prerequisite: linkedinUrl"))];
        assert_eq!(infer_failure_mode(&history), Some(FailureMode::Mapping));
    }

    #[test]
    fn downstream_station_failure_maps_to_downstream() {
        let history = vec![entry("Skip-Tracing API", StationStatus::Fail, Some("skip-tracing API returned no result"))];
        assert_eq!(infer_failure_mode(&history), Some(FailureMode::Downstream));
    }

    #[test]
    fn no_phone_with_no_failures_is_empty() {
        let outcome = outcome_with(vec![entry("Identity Resolution", StationStatus::Ok, None)], LeadRecord::new(), false);
        let event = build_final_event(&outcome);
        match event {
            ProgressEvent::Final { success, failure_mode, .. } => {
                assert!(!success);
                assert_eq!(failure_mode, Some(FailureMode::Empty));
            }
            _ => panic!("expected Final event"),
        }
    }

    #[test]
    fn budget_exhaustion_maps_to_startup() {
        let history = vec![entry("Skip-Tracing API", StationStatus::Fail, Some("budget exhausted: ..."))];
        let outcome = outcome_with(history, LeadRecord::new(), true);
        let event = build_final_event(&outcome);
        match event {
            ProgressEvent::Final { success, failure_mode, .. } => {
                assert!(!success);
                assert_eq!(failure_mode, Some(FailureMode::Startup));
            }
            _ => panic!("expected Final event"),
        }
    }
}
