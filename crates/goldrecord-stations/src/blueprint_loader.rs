use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use goldrecord_core::{EnrichError, LeadRecord, PipelineContext, Station, StopCondition};
use goldrecord_kv::KvStore;
use goldrecord_router::{domain_for_provider, GpsRouter};
use serde_json::Value as Json;
use tracing::{info, warn};

use crate::error::StationError;

const DOJO_ALERTS_CHANNEL: &str = "dojo:alerts";
const DOJO_NEEDS_MAPPING_SET: &str = "dojo:domains_need_mapping";

/// External collaborator that discovers a selector blueprint for a domain it
/// has never seen. Out of scope for this crate (selector discovery requires
/// an actual browser/scraper); [`NullAutoMapper`] always reports a miss so
/// the station still exercises its full persistent-miss path.
#[async_trait]
pub trait AutoMapper: Send + Sync {
    async fn attempt_auto_map(&self, domain: &str) -> bool;
}

pub struct NullAutoMapper;

#[async_trait]
impl AutoMapper for NullAutoMapper {
    async fn attempt_auto_map(&self, _domain: &str) -> bool {
        false
    }
}

/// Station 2: resolves the active provider to a domain and loads that
/// domain's selector blueprint out of KV, attempting a one-shot auto-map on
/// a miss before giving up and flagging the domain for manual mapping.
pub struct BlueprintLoaderStation {
    kv: Arc<dyn KvStore>,
    webhook_url: Option<String>,
    auto_mapper: Arc<dyn AutoMapper>,
}

impl BlueprintLoaderStation {
    pub fn new(kv: Arc<dyn KvStore>, webhook_url: Option<String>) -> Self {
        Self { kv, webhook_url, auto_mapper: Arc::new(NullAutoMapper) }
    }

    pub fn with_auto_mapper(mut self, auto_mapper: Arc<dyn AutoMapper>) -> Self {
        self.auto_mapper = auto_mapper;
        self
    }

    async fn read_blueprint(&self, domain: &str) -> Result<Option<Json>, StationError> {
        for key in [format!("BLUEPRINT:{domain}"), format!("blueprint:{domain}")] {
            let fields = self.kv.hgetall(&key).await?;
            if fields.is_empty() {
                continue;
            }
            let map: std::collections::HashMap<_, _> = fields.into_iter().collect();
            if let Some(raw) = map.get("data").or_else(|| map.get("blueprint_json")) {
                if let Ok(json) = serde_json::from_str::<Json>(raw) {
                    return Ok(Some(json));
                }
            }
            if let Some(instructions) = map.get("instructions") {
                return Ok(Some(Json::String(instructions.clone())));
            }
        }
        Ok(None)
    }

    async fn flag_mapping_required(&self, domain: &str) -> Result<(), StationError> {
        let payload = serde_json::json!({ "type": "mapping_required", "domain": domain }).to_string();
        self.kv.publish(DOJO_ALERTS_CHANNEL, &payload).await?;
        self.kv.sadd(DOJO_NEEDS_MAPPING_SET, domain).await?;
        Ok(())
    }
}

impl Station for BlueprintLoaderStation {
    fn name(&self) -> &str {
        "Blueprint Loader"
    }

    fn required_inputs(&self) -> &[&str] {
        &["linkedinUrl"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &[]
    }

    fn cost_estimate(&self) -> f64 {
        0.0
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        let lead = ctx.data();
        let router = GpsRouter::new(self.kv.as_ref(), self.webhook_url.as_deref());
        let provider = router
            .select_provider(&lead, &HashSet::new(), None)
            .await
            .map_err(StationError::from)?;
        let domain = domain_for_provider(&provider).unwrap_or("truepeoplesearch.com");

        let mut out = LeadRecord::new();
        let mut blueprint = self.read_blueprint(domain).await?;

        if blueprint.is_none() && self.auto_mapper.attempt_auto_map(domain).await {
            blueprint = self.read_blueprint(domain).await?;
        }

        match blueprint {
            Some(json) => {
                out.set("_blueprint", json.to_string());
                out.set("_blueprint_domain", domain);
                info!(domain, "blueprint loaded");
            }
            None => {
                self.flag_mapping_required(domain).await?;
                out.set("_mapping_required", domain);
                warn!(domain, "blueprint missing, flagged for mapping");
            }
        }
        Ok((out, StopCondition::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldrecord_kv::MemoryBackend;

    fn lead_with_linkedin() -> LeadRecord {
        let mut lead = LeadRecord::new();
        lead.set("linkedinUrl", "https://linkedin.com/in/jdoe");
        lead.set("name", "Jane Doe");
        lead
    }

    #[tokio::test]
    async fn loads_existing_blueprint() {
        let kv = Arc::new(MemoryBackend::new());
        kv.hset("BLUEPRINT:truepeoplesearch.com", "data", r#"{"selector":"#phone"}"#)
            .await
            .unwrap();
        let station = BlueprintLoaderStation::new(kv, None);
        let ctx = PipelineContext::new(lead_with_linkedin(), 5.0);
        let (delta, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Continue));
        assert!(delta.get("_blueprint").is_some());
        assert!(delta.get("_mapping_required").is_none());
    }

    #[tokio::test]
    async fn falls_back_to_legacy_key() {
        let kv = Arc::new(MemoryBackend::new());
        kv.hset("blueprint:truepeoplesearch.com", "instructions", "click .phone-reveal")
            .await
            .unwrap();
        let station = BlueprintLoaderStation::new(kv, None);
        let ctx = PipelineContext::new(lead_with_linkedin(), 5.0);
        let (delta, _) = station.process(&ctx).await.unwrap();
        assert_eq!(delta.get("_blueprint").unwrap().as_str(), Some("\"click .phone-reveal\""));
    }

    #[tokio::test]
    async fn persistent_miss_flags_mapping_required() {
        let kv = Arc::new(MemoryBackend::new());
        let station = BlueprintLoaderStation::new(kv.clone(), None);
        let ctx = PipelineContext::new(lead_with_linkedin(), 5.0);
        let (delta, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Continue));
        assert!(delta.get("_mapping_required").is_some());
        let members = kv.smembers(DOJO_NEEDS_MAPPING_SET).await.unwrap();
        assert!(!members.is_empty());
    }

    #[tokio::test]
    async fn auto_map_hit_reloads_blueprint() {
        struct SeedingMapper(Arc<MemoryBackend>);
        #[async_trait]
        impl AutoMapper for SeedingMapper {
            async fn attempt_auto_map(&self, domain: &str) -> bool {
                self.0
                    .hset(&format!("BLUEPRINT:{domain}"), "data", r#"{"selector":".phone"}"#)
                    .await
                    .unwrap();
                true
            }
        }
        let kv = Arc::new(MemoryBackend::new());
        let station = BlueprintLoaderStation::new(kv.clone(), None)
            .with_auto_mapper(Arc::new(SeedingMapper(kv.clone())));
        let ctx = PipelineContext::new(lead_with_linkedin(), 5.0);
        let (delta, _) = station.process(&ctx).await.unwrap();
        assert!(delta.get("_blueprint").is_some());
        assert!(delta.get("_mapping_required").is_none());
    }
}
