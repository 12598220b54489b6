use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use goldrecord_core::{
    EnrichError, FailureDetail, LeadRecord, Mission, MissionResult, PipelineContext, ProgressEvent, Station,
    StopCondition,
};
use goldrecord_kv::KvStore;
use goldrecord_router::{domain_for_provider, needs_olmocr_verification, results_differ_significantly, GpsRouter};
use serde_json::Value as Json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StationError;

const PAUSE_KEY: &str = "SYSTEM_STATE:PAUSED";
const PAUSE_POLL_MAX: Duration = Duration::from_secs(120);
const PAUSE_POLL_STEP: Duration = Duration::from_secs(15);
const DEFAULT_MISSION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MISSION_QUEUE: &str = "chimera:missions";
const DEFAULT_MISSION_DLQ: &str = "chimera:missions:dlq";
const TELEMETRY_POLL: Duration = Duration::from_secs(1);
const MISSION_STATUS_TTL: Duration = Duration::from_secs(86_400);

/// No `stats.py`-equivalent carrier roster survived retrieval; this is the
/// closed candidate set `preferred_carrier_for_domain` samples from, chosen
/// to cover the major US mobile carriers a people-search result's phone
/// number is plausibly routed through.
const CARRIER_CANDIDATES: &[&str] = &["verizon", "att", "tmobile", "sprint", "uscellular"];

enum MissionOutcome {
    Success(MissionResult),
    Failure,
}

/// Station 3, and the heart of the system: dispatches a lead out to the
/// external browser-worker fleet over the `chimera:missions` queue, waits
/// (with telemetry tailing) for a reply on `chimera:results:{mission_id}`,
/// and on failure walks the router's provider-failover chain until either a
/// mission succeeds or providers are exhausted.
pub struct ChimeraStation {
    kv: Arc<dyn KvStore>,
    webhook_url: Option<String>,
    mission_timeout: Duration,
    mission_queue: String,
    mission_dlq: String,
}

impl ChimeraStation {
    pub fn new(kv: Arc<dyn KvStore>, webhook_url: Option<String>) -> Self {
        Self {
            kv,
            webhook_url,
            mission_timeout: DEFAULT_MISSION_TIMEOUT,
            mission_queue: DEFAULT_MISSION_QUEUE.to_string(),
            mission_dlq: DEFAULT_MISSION_DLQ.to_string(),
        }
    }

    pub fn with_mission_timeout(mut self, timeout: Duration) -> Self {
        self.mission_timeout = timeout;
        self
    }

    /// Overrides the outbound mission queue name (`CHIMERA_MISSION_QUEUE`).
    pub fn with_mission_queue(mut self, queue: impl Into<String>) -> Self {
        self.mission_queue = queue.into();
        self
    }

    /// Overrides the mission dead-letter queue name (`CHIMERA_MISSION_DLQ`),
    /// where missions that timed out, failed, or came back unparseable are
    /// recorded for operator inspection.
    pub fn with_mission_dlq(mut self, dlq: impl Into<String>) -> Self {
        self.mission_dlq = dlq.into();
        self
    }

    /// Best-effort: a mission that already failed for its own reason
    /// shouldn't also fail the station because the DLQ write didn't land.
    async fn dead_letter_mission(&self, mission: &Mission, reason: &str) {
        let record = serde_json::json!({
            "mission_id": mission.mission_id,
            "target_provider": mission.target_provider,
            "reason": reason,
        });
        if let Err(err) = self.kv.lpush(&self.mission_dlq, &record.to_string()).await {
            warn!(mission_id = %mission.mission_id, %err, "failed to record mission on the dead-letter queue");
        }
    }

    async fn wait_out_pause(&self) -> Result<bool, StationError> {
        let mut waited = Duration::ZERO;
        while self.kv.exists(PAUSE_KEY).await? {
            if waited >= PAUSE_POLL_MAX {
                return Ok(true);
            }
            tokio::time::sleep(PAUSE_POLL_STEP).await;
            waited += PAUSE_POLL_STEP;
        }
        Ok(false)
    }

    async fn upsert_mission_status(&self, mission_id: Uuid, status: &str, lead: &LeadRecord) -> Result<(), StationError> {
        let key = format!("mission:{mission_id}");
        self.kv.hset(&key, "status", status).await?;
        self.kv.hset(&key, "name", &lead.name().unwrap_or_default()).await?;
        let location = format!(
            "{} {}",
            lead.string("city").unwrap_or_default(),
            lead.string("state").unwrap_or_default()
        );
        self.kv.hset(&key, "location", location.trim()).await?;
        self.kv.expire(&key, MISSION_STATUS_TTL).await?;
        Ok(())
    }

    /// Dispatches one mission to `provider` and waits for its reply, tailing
    /// the mission's telemetry list into progress substep events while it
    /// waits. Records router/carrier health either way.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_mission(
        &self,
        router: &GpsRouter<'_>,
        ctx: &PipelineContext,
        lead: &LeadRecord,
        provider: &str,
        domain: &str,
        carrier: Option<&str>,
        blueprint: Option<Json>,
        lead_state: &str,
    ) -> Result<MissionOutcome, StationError> {
        let mut mission_lead = lead.clone();
        mission_lead.set("target_provider", provider);
        let mission = Mission::new_deep_search(&mission_lead, provider)
            .with_carrier(carrier.map(|c| c.to_string()))
            .with_blueprint(blueprint);

        self.upsert_mission_status(mission.mission_id, "queued", lead).await?;
        self.kv
            .lpush(&self.mission_queue, &serde_json::to_string(&mission).expect("mission serializes"))
            .await?;

        let reply_key = format!("chimera:results:{}", mission.mission_id);
        let telemetry_key = format!("chimera:telemetry:{}", mission.mission_id);

        let start = Instant::now();
        let reply_future = self.kv.brpop(&reply_key, self.mission_timeout);
        tokio::pin!(reply_future);
        let reply = loop {
            tokio::select! {
                biased;
                res = &mut reply_future => break res,
                telem = self.kv.brpop(&telemetry_key, TELEMETRY_POLL) => {
                    if let Ok(Some(entry)) = telem {
                        let detail = serde_json::from_str(&entry).unwrap_or(Json::String(entry));
                        ctx.emit_progress(ProgressEvent::Substep { station: "Chimera Mission Dispatcher".to_string(), detail });
                    }
                }
            }
        }?;
        let latency_ms = start.elapsed().as_millis() as f64;

        let Some(raw) = reply else {
            router.record_result(provider, lead_state, false, latency_ms, false).await?;
            if let Some(carrier) = carrier {
                router.record_carrier_result(domain, carrier, false).await?;
            }
            self.upsert_mission_status(mission.mission_id, "timeout", lead).await?;
            warn!(provider, mission_id = %mission.mission_id, "chimera mission timed out");
            self.dead_letter_mission(&mission, "timeout").await;
            return Ok(MissionOutcome::Failure);
        };
        self.kv.del(&reply_key).await?;

        let Ok(result) = serde_json::from_str::<MissionResult>(&raw) else {
            router.record_result(provider, lead_state, false, latency_ms, false).await?;
            if let Some(carrier) = carrier {
                router.record_carrier_result(domain, carrier, false).await?;
            }
            self.upsert_mission_status(mission.mission_id, "failed", lead).await?;
            warn!(provider, "chimera reply was not a recognizable mission result");
            self.dead_letter_mission(&mission, "unparseable reply").await;
            return Ok(MissionOutcome::Failure);
        };

        if !result.is_success() {
            router.record_result(provider, lead_state, false, latency_ms, result.captcha_solved.unwrap_or(false)).await?;
            if let Some(carrier) = carrier {
                router.record_carrier_result(domain, carrier, false).await?;
            }
            self.upsert_mission_status(mission.mission_id, "failed", lead).await?;
            warn!(provider, error = result.error.as_deref().unwrap_or(""), "chimera mission reported failure");
            self.dead_letter_mission(&mission, result.error.as_deref().unwrap_or("worker reported failure")).await;
            return Ok(MissionOutcome::Failure);
        }

        router.record_result(provider, lead_state, true, latency_ms, result.captcha_solved.unwrap_or(false)).await?;
        if let Some(carrier) = carrier {
            router.record_carrier_result(domain, carrier, true).await?;
        }
        self.upsert_mission_status(mission.mission_id, "completed", lead).await?;
        info!(provider, mission_id = %mission.mission_id, "chimera mission completed");
        Ok(MissionOutcome::Success(result))
    }

    async fn check_poison(&self, router: &GpsRouter<'_>, provider: &str, result: &MissionResult, lead_id: &str) -> Result<(), StationError> {
        let poison = router.poison();
        if let Some(phone) = &result.phone {
            poison.record_data_point(provider, "phone", phone, lead_id).await?;
        }
        if let Some(email) = &result.email {
            poison.record_data_point(provider, "email", email, lead_id).await?;
        }
        Ok(())
    }
}

fn apply_result(delta: &mut LeadRecord, result: &MissionResult) {
    if let Some(phone) = &result.phone {
        delta.set("phone", phone.clone());
        delta.set("chimera_phone", phone.clone());
    }
    if let Some(age) = result.age {
        delta.set("age", age);
        delta.set("chimera_age", age);
    }
    if let Some(income) = &result.income {
        match income {
            Json::String(s) => {
                delta.set("income", s.clone());
                delta.set("chimera_income", s.clone());
            }
            Json::Number(n) => {
                let v = n.as_f64().unwrap_or(0.0);
                delta.set("income", v);
                delta.set("chimera_income", v);
            }
            _ => {}
        }
    }
    if let Some(email) = &result.email {
        delta.set("email", email.clone());
        delta.set("chimera_email", email.clone());
    }
    if let Ok(raw) = serde_json::to_string(result) {
        delta.set("chimera_raw", raw);
    }
}

impl Station for ChimeraStation {
    fn name(&self) -> &str {
        "Chimera Mission Dispatcher"
    }

    fn required_inputs(&self) -> &[&str] {
        &["linkedinUrl"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &["chimera_phone", "chimera_age", "chimera_income", "chimera_email", "phone", "email", "chimera_raw"]
    }

    fn cost_estimate(&self) -> f64 {
        0.25
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        if self.wait_out_pause().await.map_err(StationError::from)? {
            return Ok((LeadRecord::new(), StopCondition::Continue));
        }

        let lead = ctx.data();
        let name = lead.name().unwrap_or_default();
        if name.trim().is_empty() {
            return Ok((
                LeadRecord::new(),
                StopCondition::Fail(FailureDetail::new("cannot resolve a name to dispatch a mission for")),
            ));
        }
        let lead_id = lead.string("linkedinUrl").map(str::to_string).unwrap_or(name.clone());
        let lead_state_key = lead_id.clone();

        let router = GpsRouter::new(self.kv.as_ref(), self.webhook_url.as_deref());
        let mut tried: HashSet<String> = HashSet::new();
        let mut delta = LeadRecord::new();

        let blueprint = lead
            .string("_blueprint")
            .and_then(|raw| serde_json::from_str::<Json>(raw).ok());

        let mut provider_opt = Some(router.select_provider(&lead, &tried, None).await.map_err(StationError::from)?);

        while let Some(provider) = provider_opt.take() {
            tried.insert(provider.clone());
            let domain = domain_for_provider(&provider).unwrap_or("truepeoplesearch.com");
            let carrier = router
                .preferred_carrier_for_domain(domain, CARRIER_CANDIDATES)
                .await
                .map_err(StationError::from)?;

            let outcome = self
                .dispatch_mission(&router, ctx, &lead, &provider, domain, carrier.as_deref(), blueprint.clone(), &lead_state_key)
                .await
                .map_err(StationError::from)?;

            match outcome {
                MissionOutcome::Success(result) => {
                    apply_result(&mut delta, &result);
                    self.check_poison(&router, &provider, &result, &lead_id).await.map_err(StationError::from)?;
                    if needs_olmocr_verification(&result) {
                        delta.set("NEEDS_OLMOCR_VERIFICATION", true);
                    }
                    if lead.is_high_value() {
                        if let Some(second_provider) =
                            router.get_next_provider(&provider, &tried).await.map_err(StationError::from)?
                        {
                            let second_domain = domain_for_provider(&second_provider).unwrap_or(domain);
                            let second_carrier = router
                                .preferred_carrier_for_domain(second_domain, CARRIER_CANDIDATES)
                                .await
                                .map_err(StationError::from)?;
                            let second_outcome = self
                                .dispatch_mission(
                                    &router,
                                    ctx,
                                    &lead,
                                    &second_provider,
                                    second_domain,
                                    second_carrier.as_deref(),
                                    blueprint.clone(),
                                    &lead_state_key,
                                )
                                .await
                                .map_err(StationError::from)?;
                            if let MissionOutcome::Success(second_result) = second_outcome {
                                if results_differ_significantly(&result, &second_result) {
                                    delta.set("NEEDS_RECONCILIATION", true);
                                }
                            }
                            // A timed-out/failed second mission leaves NEEDS_RECONCILIATION
                            // unset, matching the upstream behavior this mirrors.
                        }
                    }
                }
                MissionOutcome::Failure => {
                    provider_opt = router.get_next_provider(&provider, &tried).await.map_err(StationError::from)?;
                }
            }
        }

        Ok((delta, StopCondition::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldrecord_kv::MemoryBackend;

    fn high_value_lead() -> LeadRecord {
        let mut lead = LeadRecord::new();
        lead.set("name", "Jane Doe");
        lead.set("linkedinUrl", "https://linkedin.com/in/jdoe");
        lead.set("company", "Acme");
        lead.set("title", "VP Sales");
        lead
    }

    async fn fake_worker_reply(kv: &MemoryBackend, provider: &str, result_json: &str) {
        // Poll chimera:missions until the dispatch station has pushed its
        // mission, then reply on the matching results key.
        for _ in 0..200 {
            if kv.llen("chimera:missions").await.unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let raw = kv.brpop("chimera:missions", Duration::from_millis(50)).await.unwrap().unwrap();
        let mission: Json = serde_json::from_str(&raw).unwrap();
        assert_eq!(mission["target_provider"], provider);
        let mission_id = mission["mission_id"].as_str().unwrap();
        kv.lpush(&format!("chimera:results:{mission_id}"), result_json).await.unwrap();
    }

    #[tokio::test]
    async fn missing_name_fails_without_dispatch() {
        let kv = Arc::new(MemoryBackend::new());
        let station = ChimeraStation::new(kv, None);
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let (_, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Fail(_)));
    }

    #[tokio::test]
    async fn successful_mission_merges_phone_and_raw_prefixed_fields() {
        let kv = Arc::new(MemoryBackend::new());
        let station = ChimeraStation::new(kv.clone(), None).with_mission_timeout(Duration::from_secs(2));
        let ctx = PipelineContext::new(high_value_lead(), 5.0);

        let kv_for_worker = kv.clone();
        let worker = tokio::spawn(async move {
            fake_worker_reply(
                &kv_for_worker,
                "TruePeopleSearch",
                r#"{"mission_id":"00000000-0000-0000-0000-000000000000","status":"completed","phone":"+15551234567","vision_confidence":0.99}"#,
            )
            .await;
        });

        let (delta, stop) = station.process(&ctx).await.unwrap();
        worker.await.unwrap();

        assert!(matches!(stop, StopCondition::Continue));
        assert_eq!(delta.string("phone"), Some("+15551234567"));
        assert_eq!(delta.string("chimera_phone"), Some("+15551234567"));
        assert!(delta.get("chimera_raw").is_some());
        assert!(delta.get("NEEDS_OLMOCR_VERIFICATION").is_none());
    }

    #[tokio::test]
    async fn low_vision_confidence_flags_olmocr_verification() {
        let kv = Arc::new(MemoryBackend::new());
        let station = ChimeraStation::new(kv.clone(), None).with_mission_timeout(Duration::from_secs(2));
        let mut lead = LeadRecord::new();
        lead.set("name", "Jane Doe");
        lead.set("linkedinUrl", "https://linkedin.com/in/jdoe");
        let ctx = PipelineContext::new(lead, 5.0);

        let kv_for_worker = kv.clone();
        let worker = tokio::spawn(async move {
            fake_worker_reply(
                &kv_for_worker,
                "TruePeopleSearch",
                r#"{"mission_id":"00000000-0000-0000-0000-000000000000","status":"completed","phone":"+15551234567","vision_confidence":0.5}"#,
            )
            .await;
        });

        let (delta, _) = station.process(&ctx).await.unwrap();
        worker.await.unwrap();
        assert_eq!(delta.get("NEEDS_OLMOCR_VERIFICATION").and_then(|v| v.as_bool()), Some(true));
    }

    #[tokio::test]
    async fn mission_timeout_without_worker_continues_with_no_delta() {
        let kv = Arc::new(MemoryBackend::new());
        let station = ChimeraStation::new(kv, None).with_mission_timeout(Duration::from_millis(50));
        let ctx = PipelineContext::new(high_value_lead(), 5.0);
        let (delta, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Continue));
        assert!(delta.get("phone").is_none());
    }

    #[tokio::test]
    async fn with_mission_queue_dispatches_to_the_configured_queue_not_the_default() {
        // No worker drains "custom:missions" here, so every provider the
        // station walks through before giving up leaves its mission sitting
        // there — what matters is that none land on the default queue name.
        let kv = Arc::new(MemoryBackend::new());
        let station = ChimeraStation::new(kv.clone(), None)
            .with_mission_timeout(Duration::from_millis(20))
            .with_mission_queue("custom:missions");
        let ctx = PipelineContext::new(high_value_lead(), 5.0);

        let (_delta, stop) = station.process(&ctx).await.unwrap();

        assert!(matches!(stop, StopCondition::Continue));
        assert_eq!(kv.llen("chimera:missions").await.unwrap(), 0);
        assert_eq!(
            kv.llen("custom:missions").await.unwrap() as usize,
            goldrecord_router::MAGAZINE.len()
        );
    }

    #[tokio::test]
    async fn timed_out_mission_is_recorded_on_the_configured_dlq() {
        // With no worker replying at all, the station walks the whole
        // Magazine via get_next_provider before giving up, dead-lettering
        // one timed-out mission per provider tried.
        let kv = Arc::new(MemoryBackend::new());
        let station = ChimeraStation::new(kv.clone(), None)
            .with_mission_timeout(Duration::from_millis(20))
            .with_mission_dlq("custom:missions:dlq");
        let ctx = PipelineContext::new(high_value_lead(), 5.0);

        station.process(&ctx).await.unwrap();

        assert_eq!(
            kv.llen("custom:missions:dlq").await.unwrap() as usize,
            goldrecord_router::MAGAZINE.len()
        );
        let raw = kv.brpop("custom:missions:dlq", Duration::from_millis(50)).await.unwrap().unwrap();
        let record: Json = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["reason"], "timeout");
    }
}
