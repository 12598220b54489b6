use std::collections::HashSet;

use goldrecord_core::LeadRecord;
use goldrecord_kv::KvStore;
use rand::Rng;
use tracing::debug;

use crate::error::RouterError;
use crate::health_store::HealthStore;
use crate::magazine::{default_provider, MAGAZINE};
use crate::poison::PoisonTracker;

/// Probability of exploring a uniformly random eligible provider instead of
/// the highest-scoring one.
const EPSILON: f64 = 0.1;
/// Weight of the latency penalty in the score; higher values punish slow
/// providers more aggressively relative to their success rate.
const LATENCY_WEIGHT: f64 = 0.2;
/// Fixed score bonus given to an explicitly preferred provider (e.g. a
/// best-effort hint from an external predictor); it still has to beat every
/// other eligible candidate to be chosen.
const PREFERRED_BIAS: f64 = 0.15;
/// Latencies at or above this are treated as maximally penalized; keeps one
/// pathological outlier from swamping every other provider's score.
const LATENCY_NORMALIZATION_MS: f64 = 10_000.0;

pub struct GpsRouter<'a> {
    kv: &'a dyn KvStore,
    webhook_url: Option<&'a str>,
}

impl<'a> GpsRouter<'a> {
    pub fn new(kv: &'a dyn KvStore, webhook_url: Option<&'a str>) -> Self {
        Self { kv, webhook_url }
    }

    fn health_store(&self) -> HealthStore<'a> {
        HealthStore::new(self.kv)
    }

    fn poison_tracker(&self) -> PoisonTracker<'a> {
        PoisonTracker::new(self.kv, self.webhook_url)
    }

    /// Deterministic bucket for bandit purposes: `"{company}+{city}"`,
    /// lower-cased, falling back to `"unknown"` for either side that is
    /// absent. Leads in the same bucket are assumed to behave similarly for
    /// provider-selection purposes.
    pub fn lead_state(&self, lead: &LeadRecord) -> String {
        let company = lead.company().unwrap_or("unknown").trim().to_lowercase();
        let city = lead.string("city").unwrap_or("unknown").trim().to_lowercase();
        let company = if company.is_empty() { "unknown".to_string() } else { company };
        let city = if city.is_empty() { "unknown".to_string() } else { city };
        format!("{company}+{city}")
    }

    async fn eligible(&self, tried: &HashSet<String>) -> Result<Vec<&'static str>, RouterError> {
        let poison = self.poison_tracker();
        let mut eligible = Vec::new();
        for provider in MAGAZINE {
            if tried.contains(*provider) {
                continue;
            }
            if poison.is_blacklisted(provider).await? {
                continue;
            }
            eligible.push(*provider);
        }
        Ok(eligible)
    }

    async fn score(&self, provider: &str, preferred: Option<&str>) -> Result<f64, RouterError> {
        let health = self.health_store().provider_health(provider).await?;
        let latency_penalty = (health.avg_latency_ms / LATENCY_NORMALIZATION_MS).min(1.0);
        let mut score = health.success_rate() - LATENCY_WEIGHT * latency_penalty;
        if preferred == Some(provider) {
            score += PREFERRED_BIAS;
        }
        Ok(score)
    }

    /// Chooses a provider for `lead`, excluding anything in `tried` or
    /// blacklisted. Always returns a provider — if none are eligible, falls
    /// back to [`default_provider`] rather than forcing every caller to
    /// handle an empty-selection case (unlike [`Self::get_next_provider`],
    /// which legitimately returns `None`).
    pub async fn select_provider(
        &self,
        _lead: &LeadRecord,
        tried: &HashSet<String>,
        preferred: Option<&str>,
    ) -> Result<String, RouterError> {
        let eligible = self.eligible(tried).await?;
        if eligible.is_empty() {
            return Ok(default_provider().to_string());
        }
        self.pick(&eligible, preferred).await
    }

    /// Next candidate after `failed`, respecting the same exclusions as
    /// [`Self::select_provider`]. Returns `None` once providers are
    /// genuinely exhausted — callers must handle that case, it is not papered
    /// over with a default.
    pub async fn get_next_provider(
        &self,
        failed: &str,
        tried: &HashSet<String>,
    ) -> Result<Option<String>, RouterError> {
        let mut tried = tried.clone();
        tried.insert(failed.to_string());
        let eligible = self.eligible(&tried).await?;
        if eligible.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.pick(&eligible, None).await?))
    }

    async fn pick(&self, eligible: &[&'static str], preferred: Option<&str>) -> Result<String, RouterError> {
        if rand::thread_rng().gen_bool(EPSILON) {
            let idx = rand::thread_rng().gen_range(0..eligible.len());
            debug!(provider = eligible[idx], "router: exploring");
            return Ok(eligible[idx].to_string());
        }
        let mut best: Option<(&str, f64)> = None;
        for provider in eligible {
            let score = self.score(provider, preferred).await?;
            best = match best {
                None => Some((*provider, score)),
                Some((best_provider, best_score)) => {
                    if score > best_score || (score == best_score && *provider < best_provider) {
                        Some((*provider, score))
                    } else {
                        Some((best_provider, best_score))
                    }
                }
            };
        }
        let (provider, score) = best.expect("eligible is non-empty");
        debug!(provider, score, "router: exploiting");
        Ok(provider.to_string())
    }

    pub async fn record_result(
        &self,
        provider: &str,
        lead_state: &str,
        success: bool,
        latency_ms: f64,
        captcha_solved: bool,
    ) -> Result<(), RouterError> {
        debug!(provider, lead_state, success, latency_ms, "router: recording result");
        self.health_store()
            .record_provider_result(provider, success, latency_ms, captcha_solved)
            .await
    }

    pub async fn preferred_carrier_for_domain(&self, domain: &str, candidates: &[&str]) -> Result<Option<String>, RouterError> {
        self.health_store().preferred_carrier_for_domain(domain, candidates).await
    }

    pub async fn record_carrier_result(&self, domain: &str, carrier: &str, success: bool) -> Result<(), RouterError> {
        self.health_store().record_carrier_result(domain, carrier, success).await
    }

    pub fn poison(&self) -> PoisonTracker<'a> {
        self.poison_tracker()
    }
}
