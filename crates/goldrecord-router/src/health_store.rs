use goldrecord_core::HealthSnapshot;
use goldrecord_kv::KvStore;

use crate::error::RouterError;

/// Reads and writes the `provider_health:{name}` / `carrier_health:{domain}:{carrier}`
/// hashes. A missing hash means "unknown, treat as neutral" — see
/// [`HealthSnapshot::success_rate`]. No compare-and-set: concurrent writers
/// may lose an update, which is acceptable per the pipeline's tolerance for
/// occasional stale health data (this never affects correctness, only which
/// provider gets picked next).
pub struct HealthStore<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> HealthStore<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    pub async fn provider_health(&self, provider: &str) -> Result<HealthSnapshot, RouterError> {
        self.read(&provider_key(provider)).await
    }

    pub async fn record_provider_result(
        &self,
        provider: &str,
        success: bool,
        latency_ms: f64,
        captcha_solved: bool,
    ) -> Result<(), RouterError> {
        let key = provider_key(provider);
        let mut snapshot = self.read(&key).await?;
        snapshot.record(success, latency_ms, captcha_solved);
        self.write(&key, &snapshot).await
    }

    pub async fn carrier_health(&self, domain: &str, carrier: &str) -> Result<HealthSnapshot, RouterError> {
        self.read(&carrier_key(domain, carrier)).await
    }

    pub async fn record_carrier_result(&self, domain: &str, carrier: &str, success: bool) -> Result<(), RouterError> {
        let key = carrier_key(domain, carrier);
        let mut snapshot = self.read(&key).await?;
        snapshot.record(success, snapshot.avg_latency_ms, false);
        self.write(&key, &snapshot).await
    }

    /// Best guess at the carrier with the highest recorded success rate for
    /// a domain. Returns `None` when no carrier has any recorded data yet —
    /// callers fall back to letting the worker fleet pick a default.
    pub async fn preferred_carrier_for_domain(
        &self,
        domain: &str,
        candidates: &[&str],
    ) -> Result<Option<String>, RouterError> {
        let mut best: Option<(String, f64)> = None;
        for carrier in candidates {
            let health = self.carrier_health(domain, carrier).await?;
            if health.attempts == 0 {
                continue;
            }
            let rate = health.success_rate();
            if best.as_ref().is_none_or(|(_, best_rate)| rate > *best_rate) {
                best = Some(((*carrier).to_string(), rate));
            }
        }
        Ok(best.map(|(carrier, _)| carrier))
    }

    async fn read(&self, key: &str) -> Result<HealthSnapshot, RouterError> {
        let fields = self.kv.hgetall(key).await?;
        let mut snapshot = HealthSnapshot::default();
        for (field, value) in fields {
            match field.as_str() {
                "attempts" => snapshot.attempts = value.parse().unwrap_or(0),
                "successes" => snapshot.successes = value.parse().unwrap_or(0),
                "captcha_solves" => snapshot.captcha_solves = value.parse().unwrap_or(0),
                "avg_latency_ms" => snapshot.avg_latency_ms = value.parse().unwrap_or(0.0),
                _ => {}
            }
        }
        Ok(snapshot)
    }

    async fn write(&self, key: &str, snapshot: &HealthSnapshot) -> Result<(), RouterError> {
        self.kv.hset(key, "attempts", &snapshot.attempts.to_string()).await?;
        self.kv.hset(key, "successes", &snapshot.successes.to_string()).await?;
        self.kv.hset(key, "captcha_solves", &snapshot.captcha_solves.to_string()).await?;
        self.kv.hset(key, "avg_latency_ms", &snapshot.avg_latency_ms.to_string()).await?;
        Ok(())
    }
}

fn provider_key(provider: &str) -> String {
    format!("provider_health:{provider}")
}

fn carrier_key(domain: &str, carrier: &str) -> String {
    format!("carrier_health:{domain}:{carrier}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldrecord_kv::MemoryBackend;

    #[tokio::test]
    async fn unknown_provider_has_no_recorded_attempts() {
        let kv = MemoryBackend::new();
        let store = HealthStore::new(&kv);
        let snapshot = store.provider_health("Nobody").await.unwrap();
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.success_rate(), 0.5);
    }

    #[tokio::test]
    async fn record_result_persists_across_reads() {
        let kv = MemoryBackend::new();
        let store = HealthStore::new(&kv);
        store.record_provider_result("FastPeopleSearch", true, 500.0, false).await.unwrap();
        let snapshot = store.provider_health("FastPeopleSearch").await.unwrap();
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.successes, 1);
    }

    #[tokio::test]
    async fn preferred_carrier_picks_highest_success_rate() {
        let kv = MemoryBackend::new();
        let store = HealthStore::new(&kv);
        store.record_carrier_result("truepeoplesearch.com", "verizon", true).await.unwrap();
        store.record_carrier_result("truepeoplesearch.com", "att", false).await.unwrap();
        let best = store
            .preferred_carrier_for_domain("truepeoplesearch.com", &["verizon", "att"])
            .await
            .unwrap();
        assert_eq!(best.as_deref(), Some("verizon"));
    }

    #[tokio::test]
    async fn preferred_carrier_is_none_without_data() {
        let kv = MemoryBackend::new();
        let store = HealthStore::new(&kv);
        let best = store
            .preferred_carrier_for_domain("truepeoplesearch.com", &["verizon", "att"])
            .await
            .unwrap();
        assert_eq!(best, None);
    }
}
