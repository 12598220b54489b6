use std::sync::Arc;

use goldrecord_core::DynStation;
use goldrecord_kv::KvStore;
use goldrecord_stations::{
    BlueprintLoaderStation, ChimeraStation, DatabaseSaveStation, DemographicsStation, DncGatekeeperStation,
    IdentityResolutionStation, LeadSink, ScraperEnrichmentStation, SkipTracingStation, TelnyxGatekeepStation,
};

use crate::config::WorkerConfig;

/// Builds the station route named by `config.pipeline_name` (`PIPELINE_NAME`
/// per deployment). Stations are constructed fresh per call — they are
/// stateless aside from the injected `kv`/`sink` handles, so nothing here
/// needs to survive across calls the way a module-level singleton would in
/// earlier prototypes of this pipeline.
///
/// Recognized names:
/// - `"default"` (or unset): the full nine-station enrichment route.
/// - `"core"`: identity → blueprint → Chimera → database save only, skipping
///   every paid downstream gate (scraper, skip-tracing, Telnyx, demographics).
///   Useful for a budget-constrained deployment that only wants Chimera's
///   phone, not the full enrichment tail.
pub fn build_route(
    config: &WorkerConfig,
    kv: Arc<dyn KvStore>,
    sink: Arc<dyn LeadSink>,
) -> Vec<Arc<dyn DynStation>> {
    match config.pipeline_name.as_str() {
        "core" => build_core_route(config, kv, sink),
        _ => build_default_route(config, kv, sink),
    }
}

fn build_default_route(config: &WorkerConfig, kv: Arc<dyn KvStore>, sink: Arc<dyn LeadSink>) -> Vec<Arc<dyn DynStation>> {
    vec![
        Arc::new(IdentityResolutionStation),
        Arc::new(BlueprintLoaderStation::new(kv.clone(), config.webhook_url.clone())),
        Arc::new(
            ChimeraStation::new(kv.clone(), config.webhook_url.clone())
                .with_mission_timeout(config.chimera_station_timeout)
                .with_mission_queue(config.mission_queue.clone())
                .with_mission_dlq(config.mission_dlq.clone()),
        ),
        Arc::new(ScraperEnrichmentStation),
        Arc::new(SkipTracingStation::from_env()),
        Arc::new(TelnyxGatekeepStation::from_env()),
        Arc::new(DncGatekeeperStation),
        Arc::new(DemographicsStation::default()),
        Arc::new(DatabaseSaveStation::new(sink)),
    ]
}

fn build_core_route(config: &WorkerConfig, kv: Arc<dyn KvStore>, sink: Arc<dyn LeadSink>) -> Vec<Arc<dyn DynStation>> {
    vec![
        Arc::new(IdentityResolutionStation),
        Arc::new(BlueprintLoaderStation::new(kv.clone(), config.webhook_url.clone())),
        Arc::new(
            ChimeraStation::new(kv.clone(), config.webhook_url.clone())
                .with_mission_timeout(config.chimera_station_timeout)
                .with_mission_queue(config.mission_queue.clone())
                .with_mission_dlq(config.mission_dlq.clone()),
        ),
        Arc::new(DatabaseSaveStation::new(sink)),
    ]
}

#[cfg(test)]
mod tests {
    use goldrecord_kv::MemoryBackend;
    use goldrecord_pipeline::validate_route;
    use goldrecord_stations::InMemoryLeadSink;

    use super::*;

    #[test]
    fn default_route_is_well_formed() {
        let kv = Arc::new(MemoryBackend::new());
        let sink = Arc::new(InMemoryLeadSink::new());
        let route = build_route(&WorkerConfig::default(), kv, sink);
        assert_eq!(route.len(), 9);
        validate_route(&route).expect("default route has no duplicate station names");
    }

    #[test]
    fn core_route_skips_paid_downstream_stations() {
        let kv = Arc::new(MemoryBackend::new());
        let sink = Arc::new(InMemoryLeadSink::new());
        let config = WorkerConfig { pipeline_name: "core".to_string(), ..WorkerConfig::default() };
        let route = build_route(&config, kv, sink);
        assert_eq!(route.len(), 4);
        validate_route(&route).expect("core route has no duplicate station names");
        assert!(!route.iter().any(|s| s.name() == "Skip-Tracing API"));
    }

    #[test]
    fn unknown_pipeline_name_falls_back_to_default() {
        let kv = Arc::new(MemoryBackend::new());
        let sink = Arc::new(InMemoryLeadSink::new());
        let config = WorkerConfig { pipeline_name: "nonexistent".to_string(), ..WorkerConfig::default() };
        let route = build_route(&config, kv, sink);
        assert_eq!(route.len(), 9);
    }
}
