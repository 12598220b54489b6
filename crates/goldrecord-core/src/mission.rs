use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::value::LeadRecord;

/// A unit of work dispatched to the external browser-worker fleet over
/// `chimera:missions`. `mission_id` is the correlation key for the reply on
/// `chimera:results:{mission_id}` and must be globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: Uuid,
    pub lead: Json,
    pub instruction: String,
    pub target: String,
    pub target_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<Json>,
}

impl Mission {
    pub fn new_deep_search(lead: &LeadRecord, target_provider: impl Into<String>) -> Self {
        Self {
            mission_id: Uuid::new_v4(),
            lead: lead.to_json(),
            instruction: "deep_search".to_string(),
            target: "linkedin_profile".to_string(),
            target_provider: target_provider.into(),
            carrier: None,
            blueprint: None,
        }
    }

    pub fn with_carrier(mut self, carrier: Option<String>) -> Self {
        self.carrier = carrier;
        self
    }

    pub fn with_blueprint(mut self, blueprint: Option<Json>) -> Self {
        self.blueprint = blueprint;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Queued,
    Completed,
    Failed,
    Timeout,
}

/// The reply a worker LPUSHes onto `chimera:results:{mission_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionResult {
    pub mission_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub income: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha_solved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MissionResult {
    pub fn is_success(&self) -> bool {
        self.status != "failed"
    }
}
