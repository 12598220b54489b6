use std::sync::Arc;
use std::time::Duration;

use goldrecord_core::{DynStation, LeadRecord, PipelineContext};
use goldrecord_kv::KvStore;
use goldrecord_pipeline::run_pipeline;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::failure_mode::build_final_event;
use crate::registry::{attach, RunRegistry};

const QUEUE_KEY: &str = "leads_to_enrich";
const DLQ_KEY: &str = "failed_leads";
const RETRY_COUNT_FIELD: &str = "_retry_count";
const BRPOP_POLL: Duration = Duration::from_secs(5);

/// Queue worker loop: pops leads off `leads_to_enrich`, runs them through
/// the configured route with bounded concurrency, and retries with
/// exponential backoff before giving up to `failed_leads`.
pub struct QueueWorker {
    kv: Arc<dyn KvStore>,
    route: Vec<Arc<dyn DynStation>>,
    registry: Arc<RunRegistry>,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
}

impl QueueWorker {
    pub fn new(kv: Arc<dyn KvStore>, route: Vec<Arc<dyn DynStation>>, registry: Arc<RunRegistry>, config: WorkerConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self { kv, route, registry, config, semaphore }
    }

    /// Runs until the process is asked to shut down (never returns under
    /// normal operation). Each BRPOP result spawns a bounded task so a slow
    /// lead (Chimera's mission round-trip in particular) doesn't stall the
    /// rest of the queue.
    pub async fn run(&self) -> ! {
        info!(
            queue = QUEUE_KEY,
            max_concurrent = self.config.max_concurrent,
            pipeline = %self.config.pipeline_name,
            "queue worker started"
        );
        loop {
            match self.kv.brpop(QUEUE_KEY, BRPOP_POLL).await {
                Ok(Some(raw)) => self.spawn_one(raw).await,
                Ok(None) => continue,
                Err(err) => {
                    error!(%err, "brpop against the lead queue failed; backing off before retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn spawn_one(&self, raw: String) {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore never closes in practice; fall through defensively
        };
        let kv = self.kv.clone();
        let route = self.route.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let _permit = permit;
            process_one(kv, route, registry, config, raw).await;
        });
    }
}

async fn process_one(
    kv: Arc<dyn KvStore>,
    route: Vec<Arc<dyn DynStation>>,
    registry: Arc<RunRegistry>,
    config: WorkerConfig,
    raw: String,
) {
    let parsed: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(err) => {
            error!(%err, "dropping unparseable queue item");
            dead_letter(&kv, &raw).await;
            return;
        }
    };

    let lead = LeadRecord::from_json(parsed);
    let retry_count = lead.get(RETRY_COUNT_FIELD).and_then(|v| v.as_f64()).unwrap_or(0.0) as u32;

    let run_id = Uuid::new_v4().to_string();
    if let Err(err) = registry.create(&run_id).await {
        warn!(%run_id, %err, "failed to register run before executing it");
    }
    let (sink, _handle) = attach(registry.clone(), &run_id, 64);

    let ctx = PipelineContext::new(lead.clone(), config.budget_limit).with_progress_sink(sink);
    let outcome = run_pipeline(ctx, &route, config.step_timeout).await;

    let saved = outcome
        .history
        .iter()
        .any(|h| h.station == "Database Save" && h.status == goldrecord_core::StationStatus::Ok);

    let final_event = build_final_event(&outcome);
    let error = if saved { None } else { Some("lead did not complete with a saved record".to_string()) };
    if let Err(err) = registry.record_final(&run_id, final_event, error).await {
        warn!(%run_id, %err, "failed to record final run state");
    }

    if saved {
        info!(%run_id, stations = outcome.stations_executed, cost = outcome.total_cost, "lead enriched and saved");
        return;
    }

    if retry_count + 1 >= config.max_retries {
        warn!(%run_id, retry_count, "giving up on lead after exhausting retries; moving to dead-letter queue");
        dead_letter(&kv, &raw).await;
        return;
    }

    let backoff = config.retry_backoff_base * 2u32.pow(retry_count);
    warn!(%run_id, retry_count, backoff_secs = backoff.as_secs(), "lead failed; scheduling retry");

    let mut retry_lead = lead;
    retry_lead.set(RETRY_COUNT_FIELD, (retry_count + 1) as f64);
    requeue_after(kv, retry_lead, backoff);
}

/// Schedules a retried lead to land back on the queue after `backoff`
/// without blocking the calling task — the queue worker pool must stay free
/// to keep draining `leads_to_enrich` while this one waits out its delay.
fn requeue_after(kv: Arc<dyn KvStore>, lead: LeadRecord, backoff: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(backoff).await;
        let payload = lead.to_json().to_string();
        if let Err(err) = kv.lpush(QUEUE_KEY, &payload).await {
            error!(%err, "failed to requeue lead after backoff; dropping to dead-letter queue");
            dead_letter(&kv, &payload).await;
        }
    });
}

async fn dead_letter(kv: &Arc<dyn KvStore>, raw: &str) {
    if let Err(err) = kv.lpush(DLQ_KEY, raw).await {
        error!(%err, "failed to push lead onto the dead-letter queue; it is now lost");
    }
}

#[cfg(test)]
mod tests {
    use goldrecord_kv::MemoryBackend;
    use goldrecord_stations::{DatabaseSaveStation, InMemoryLeadSink};

    use super::*;

    fn trivial_route() -> Vec<Arc<dyn DynStation>> {
        vec![Arc::new(DatabaseSaveStation::new(Arc::new(InMemoryLeadSink::new())))]
    }

    #[tokio::test]
    async fn successful_lead_is_not_requeued_or_dead_lettered() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryBackend::new());
        let registry = Arc::new(RunRegistry::new(kv.clone(), Duration::from_secs(60)));
        let mut lead = LeadRecord::new();
        lead.set("linkedinUrl", "https://linkedin.com/in/jane-doe");
        lead.set("phone", "+15551234567");
        let raw = lead.to_json().to_string();

        process_one(kv.clone(), trivial_route(), registry, WorkerConfig::default(), raw).await;

        assert_eq!(kv.llen(QUEUE_KEY).await.unwrap(), 0);
        assert_eq!(kv.llen(DLQ_KEY).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lead_missing_required_fields_is_dead_lettered_after_final_retry() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryBackend::new());
        let registry = Arc::new(RunRegistry::new(kv.clone(), Duration::from_secs(60)));
        let mut lead = LeadRecord::new();
        lead.set(RETRY_COUNT_FIELD, 2.0); // one short of max_retries=3
        let raw = lead.to_json().to_string();

        let config = WorkerConfig { max_retries: 3, ..WorkerConfig::default() };
        process_one(kv.clone(), trivial_route(), registry, config, raw).await;

        assert_eq!(kv.llen(DLQ_KEY).await.unwrap(), 1);
        assert_eq!(kv.llen(QUEUE_KEY).await.unwrap(), 0);
    }
}
