use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use goldrecord_core::{EnrichError, LeadRecord, PipelineContext, Station, StopCondition};
use serde_json::Value as Json;
use tracing::warn;

use crate::error::StationError;

const TELNYX_API_BASE: &str = "https://api.telnyx.com/v2/number_lookup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Wireless,
    Landline,
    Voip,
    Unknown,
}

impl LineType {
    fn from_carrier_type(raw: &str) -> Self {
        match raw {
            "wireless" => Self::Wireless,
            "landline" => Self::Landline,
            "voip" => Self::Voip,
            _ => Self::Unknown,
        }
    }

    fn blocks_downstream(self) -> bool {
        matches!(self, Self::Voip | Self::Landline | Self::Unknown)
    }
}

/// Phone validation lookup, abstracted so the gate can be tested without a
/// live Telnyx call.
#[async_trait]
pub trait PhoneValidator: Send + Sync {
    async fn line_type(&self, phone: &str) -> Result<LineType, StationError>;
}

pub struct TelnyxValidator {
    client: reqwest::Client,
    api_key: String,
}

impl TelnyxValidator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into() }
    }

    pub fn from_env() -> Option<Self> {
        env::var("TELNYX_API_KEY").ok().map(Self::new)
    }
}

#[async_trait]
impl PhoneValidator for TelnyxValidator {
    async fn line_type(&self, phone: &str) -> Result<LineType, StationError> {
        let response = self
            .client
            .get(format!("{TELNYX_API_BASE}/{phone}"))
            .query(&[("type", "carrier")])
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;
        let body: Json = response.json().await?;
        let raw = body
            .pointer("/data/carrier/type")
            .and_then(Json::as_str)
            .unwrap_or("unknown");
        Ok(LineType::from_carrier_type(raw))
    }
}

/// Station: validates the phone number's line type and stops the route early
/// (`SKIP_REMAINING`) when it is VOIP, landline, or otherwise unusable for
/// outbound dialing, so downstream stations don't spend budget on a dead
/// number. A validation-call failure is treated as inconclusive and the
/// route continues rather than blocking a lead on an API outage.
pub struct TelnyxGatekeepStation {
    validator: Option<Arc<dyn PhoneValidator>>,
}

impl TelnyxGatekeepStation {
    pub fn new(validator: Option<Arc<dyn PhoneValidator>>) -> Self {
        Self { validator }
    }

    pub fn from_env() -> Self {
        Self::new(TelnyxValidator::from_env().map(|v| Arc::new(v) as Arc<dyn PhoneValidator>))
    }
}

impl Station for TelnyxGatekeepStation {
    fn name(&self) -> &str {
        "Telnyx Gatekeep"
    }

    fn required_inputs(&self) -> &[&str] {
        &["phone"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &["phone_line_type"]
    }

    fn cost_estimate(&self) -> f64 {
        0.02
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        let lead = ctx.data();
        let Some(phone) = lead.phone().filter(|p| !p.is_empty()) else {
            return Ok((LeadRecord::new(), StopCondition::Continue));
        };

        let Some(validator) = &self.validator else {
            return Ok((LeadRecord::new(), StopCondition::Continue));
        };

        match validator.line_type(phone).await {
            Ok(line_type) => {
                let mut out = LeadRecord::new();
                let label = match line_type {
                    LineType::Wireless => "wireless",
                    LineType::Landline => "landline",
                    LineType::Voip => "voip",
                    LineType::Unknown => "unknown",
                };
                out.set("phone_line_type", label);
                if line_type.blocks_downstream() {
                    Ok((out, StopCondition::SkipRemaining))
                } else {
                    Ok((out, StopCondition::Continue))
                }
            }
            Err(err) => {
                warn!(error = %err, "telnyx validation failed, continuing fail-open");
                Ok((LeadRecord::new(), StopCondition::Continue))
            }
        }
    }
}
