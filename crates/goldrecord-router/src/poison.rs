use std::time::Duration;

use goldrecord_kv::KvStore;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::RouterError;
use crate::webhook::notify_webhook;

/// Window within which the same `(provider, data_type, value)` triple is
/// tracked. Re-expired on every write, so it is a sliding window in the
/// loose sense (fresh writes push the deadline out) rather than a strict
/// per-member expiry, which is an intentional simplification over a strict
/// sliding window per member.
const POISON_TTL: Duration = Duration::from_secs(3600);
const BLACKLIST_TTL: Duration = Duration::from_secs(14_400);
/// More than this many distinct leads receiving the identical value from one
/// provider within the window trips the blacklist.
const POISON_THRESHOLD: u64 = 3;

/// Detects a provider that has started returning the same fabricated value
/// (phone/email) for many distinct leads, and blacklists it before it can
/// poison more of the Golden Record.
pub struct PoisonTracker<'a> {
    kv: &'a dyn KvStore,
    webhook_url: Option<&'a str>,
}

impl<'a> PoisonTracker<'a> {
    pub fn new(kv: &'a dyn KvStore, webhook_url: Option<&'a str>) -> Self {
        Self { kv, webhook_url }
    }

    /// Records that `provider` returned `value` (of `data_type`, e.g.
    /// `"phone"`) for `lead_id`. Returns `true` if this call tipped the
    /// provider into being blacklisted.
    pub async fn record_data_point(
        &self,
        provider: &str,
        data_type: &str,
        value: &str,
        lead_id: &str,
    ) -> Result<bool, RouterError> {
        let key = poison_key(provider, data_type, value);
        self.kv.sadd(&key, lead_id).await?;
        self.kv.expire(&key, POISON_TTL).await?;
        let distinct_leads = self.kv.scard(&key).await?;
        if distinct_leads > POISON_THRESHOLD {
            self.blacklist_provider(provider, "entropy_poison").await?;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn is_blacklisted(&self, provider: &str) -> Result<bool, RouterError> {
        Ok(self.kv.exists(&blacklist_key(provider)).await?)
    }

    pub async fn blacklist_provider(&self, provider: &str, reason: &str) -> Result<(), RouterError> {
        self.kv.set(&blacklist_key(provider), "1", Some(BLACKLIST_TTL)).await?;
        warn!(provider, reason, "provider blacklisted");
        notify_webhook(
            self.webhook_url,
            serde_json::json!({
                "event": "provider_blacklisted",
                "provider": provider,
                "reason": reason,
                "ttl_hours": BLACKLIST_TTL.as_secs() / 3600,
            }),
        )
        .await;
        Ok(())
    }
}

fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}

fn poison_key(provider: &str, data_type: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_value(value).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("poison:p:{provider}:{data_type}:{}", &digest[..24])
}

fn blacklist_key(provider: &str) -> String {
    format!("blacklist:provider:{provider}")
}
