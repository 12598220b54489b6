use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use goldrecord_core::{EnrichError, FailureDetail, LeadRecord, PipelineContext, Station, StopCondition};
use serde_json::Value as Json;
use tracing::info;

use crate::error::StationError;

const RAPIDAPI_HOST: &str = "skip-tracing-working-api.p.rapidapi.com";

/// A skip-trace lookup, abstracted behind a trait so the station can be
/// tested without an outbound HTTP call. [`RapidApiSkipTraceClient`] is the
/// real implementation, grounded on the paid RapidAPI fallback the upstream
/// reference reaches for once its free native lookup has already failed.
#[async_trait]
pub trait SkipTraceClient: Send + Sync {
    async fn by_email(&self, email: &str) -> Result<Option<String>, StationError>;
    async fn by_name_address(&self, first_name: &str, last_name: &str, city: &str, state: &str) -> Result<Option<String>, StationError>;
}

pub struct RapidApiSkipTraceClient {
    client: reqwest::Client,
    api_key: String,
}

impl RapidApiSkipTraceClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into() }
    }

    /// Builds a client from `RAPIDAPI_KEY`, returning `None` if it is unset
    /// (the station treats an absent key as "nothing to fall back to").
    pub fn from_env() -> Option<Self> {
        env::var("RAPIDAPI_KEY").ok().map(Self::new)
    }

    fn extract_phone(body: &Json) -> Option<String> {
        let phone = body.get("phone").or_else(|| body.get("phoneNumber")).or_else(|| body.get("phone_number"))?;
        match phone {
            Json::String(s) => Some(s.clone()),
            Json::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        }
    }
}

#[async_trait]
impl SkipTraceClient for RapidApiSkipTraceClient {
    async fn by_email(&self, email: &str) -> Result<Option<String>, StationError> {
        let response = self
            .client
            .get(format!("https://{RAPIDAPI_HOST}/search/byemail"))
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", RAPIDAPI_HOST)
            .query(&[("email", email), ("phone", "1")])
            .send()
            .await?
            .error_for_status()?;
        let body: Json = response.json().await?;
        Ok(Self::extract_phone(&body))
    }

    async fn by_name_address(&self, first_name: &str, last_name: &str, city: &str, state: &str) -> Result<Option<String>, StationError> {
        let response = self
            .client
            .get(format!("https://{RAPIDAPI_HOST}/search/bynameaddress"))
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", RAPIDAPI_HOST)
            .query(&[("firstName", first_name), ("lastName", last_name), ("city", city), ("state", state)])
            .send()
            .await?
            .error_for_status()?;
        let body: Json = response.json().await?;
        Ok(Self::extract_phone(&body))
    }
}

/// Station: paid skip-tracing fallback, invoked only when Chimera and the
/// free lookups ahead of it left `phone` unpopulated. Costs money every time
/// it actually calls out, so it short-circuits to a no-op `CONTINUE` the
/// moment a phone is already on the record.
pub struct SkipTracingStation {
    client: Option<Arc<dyn SkipTraceClient>>,
}

impl SkipTracingStation {
    pub fn new(client: Option<Arc<dyn SkipTraceClient>>) -> Self {
        Self { client }
    }

    pub fn from_env() -> Self {
        Self::new(RapidApiSkipTraceClient::from_env().map(|c| Arc::new(c) as Arc<dyn SkipTraceClient>))
    }
}

impl Station for SkipTracingStation {
    fn name(&self) -> &str {
        "Skip-Tracing API"
    }

    fn required_inputs(&self) -> &[&str] {
        &["firstName", "lastName"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &["phone", "email"]
    }

    fn cost_estimate(&self) -> f64 {
        0.15
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        let lead = ctx.data();
        if lead.phone().is_some_and(|p| !p.is_empty()) {
            return Ok((LeadRecord::new(), StopCondition::Continue));
        }

        let Some(client) = &self.client else {
            info!("skip-tracing: no RAPIDAPI_KEY configured, skipping paid fallback");
            return Ok((LeadRecord::new(), StopCondition::Continue));
        };

        let phone = if let Some(email) = lead.string("email").filter(|e| !e.is_empty()) {
            client.by_email(email).await.map_err(StationError::from)?
        } else {
            None
        };

        let phone = match phone {
            Some(phone) => Some(phone),
            None => {
                let first = lead.string("firstName").unwrap_or_default();
                let last = lead.string("lastName").unwrap_or_default();
                let city = lead.string("city").unwrap_or_default();
                if first.is_empty() || last.is_empty() || city.is_empty() {
                    None
                } else {
                    let state = lead.string("state").unwrap_or_default();
                    client.by_name_address(first, last, city, state).await.map_err(StationError::from)?
                }
            }
        };

        match phone {
            Some(phone) => {
                let mut out = LeadRecord::new();
                out.set("phone", phone);
                Ok((out, StopCondition::Continue))
            }
            None => Ok((
                LeadRecord::new(),
                StopCondition::Fail(FailureDetail::new("skip-tracing API returned no result")),
            )),
        }
    }
}
