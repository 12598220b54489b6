use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use goldrecord_core::{EnrichError, FailureDetail, LeadRecord, PipelineContext, Station, StopCondition};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::StationError;

/// 0.0-1.0. Low when e.g. a "junior"/"associate"/"intern" title carries a
/// suspiciously high income, which is the signature of a stale or mismatched
/// record rather than a genuine high earner.
fn confidence_income(income: Option<f64>, title: &str) -> f64 {
    let Some(income) = income else { return 1.0 };
    let t = title.to_lowercase();
    if (t.contains("junior") || t.contains("associate") || t.contains("intern")) && income > 100_000.0 {
        0.3
    } else {
        1.0
    }
}

/// 0.0-1.0. Low when age suggests retirement but the title gives no
/// indication the person has retired.
fn confidence_age(age: Option<f64>, title: &str) -> f64 {
    let Some(age) = age else { return 1.0 };
    if age > 59.0 && !title.to_lowercase().contains("retir") {
        0.6
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoldenRecord {
    pub linkedin_url: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub age: Option<f64>,
    pub income: Option<f64>,
    pub dnc_status: Option<String>,
    pub can_contact: Option<bool>,
    pub confidence_age: f64,
    pub confidence_income: f64,
    pub source_metadata: Json,
}

impl GoldenRecord {
    /// Merges `incoming` over `self`: every field follows `COALESCE(new,
    /// old)` — a non-null incoming value always wins, a null one never
    /// overwrites what's already on record.
    fn merge_from(&mut self, incoming: GoldenRecord) {
        macro_rules! coalesce {
            ($field:ident) => {
                if incoming.$field.is_some() {
                    self.$field = incoming.$field;
                }
            };
        }
        coalesce!(name);
        coalesce!(phone);
        coalesce!(email);
        coalesce!(city);
        coalesce!(state);
        coalesce!(zipcode);
        coalesce!(age);
        coalesce!(income);
        coalesce!(dnc_status);
        coalesce!(can_contact);
        self.confidence_age = incoming.confidence_age;
        self.confidence_income = incoming.confidence_income;
        self.source_metadata = incoming.source_metadata;
    }
}

/// Persistence seam standing in for the upstream Postgres `leads` table,
/// which is out of scope for this crate. Implementations only need to honor
/// the upsert-merge contract in [`GoldenRecord::merge_from`].
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn upsert(&self, record: GoldenRecord) -> Result<GoldenRecord, StationError>;
}

#[derive(Default)]
pub struct InMemoryLeadSink {
    records: Mutex<HashMap<String, GoldenRecord>>,
}

impl InMemoryLeadSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, linkedin_url: &str) -> Option<GoldenRecord> {
        self.records.lock().unwrap().get(linkedin_url).cloned()
    }
}

#[async_trait]
impl LeadSink for InMemoryLeadSink {
    async fn upsert(&self, record: GoldenRecord) -> Result<GoldenRecord, StationError> {
        let mut records = self.records.lock().unwrap();
        let merged = match records.remove(&record.linkedin_url) {
            Some(mut existing) => {
                existing.merge_from(record);
                existing
            }
            None => record,
        };
        records.insert(merged.linkedin_url.clone(), merged.clone());
        Ok(merged)
    }
}

/// Station: persists the final enriched record via [`LeadSink`], computing
/// the Golden Record confidence scores and source attribution that flag a
/// lead for manual (vision-model) review.
pub struct DatabaseSaveStation {
    sink: std::sync::Arc<dyn LeadSink>,
}

impl DatabaseSaveStation {
    pub fn new(sink: std::sync::Arc<dyn LeadSink>) -> Self {
        Self { sink }
    }
}

impl Station for DatabaseSaveStation {
    fn name(&self) -> &str {
        "Database Save"
    }

    fn required_inputs(&self) -> &[&str] {
        &["linkedinUrl"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &["needs_vlm_check"]
    }

    fn cost_estimate(&self) -> f64 {
        0.0
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        let lead = ctx.data();
        let Some(linkedin_url) = lead.string("linkedinUrl").filter(|u| !u.is_empty()) else {
            return Ok((
                LeadRecord::new(),
                StopCondition::Fail(FailureDetail::new("cannot save a lead without a linkedinUrl")),
            ));
        };

        let title = lead.title().unwrap_or_default().to_string();
        let age = lead.get("age").and_then(|v| v.as_f64()).or_else(|| lead.get("chimera_age").and_then(|v| v.as_f64()));
        let income = lead
            .get("income")
            .and_then(|v| v.as_f64())
            .or_else(|| lead.get("median_household_income").and_then(|v| v.as_f64()))
            .or_else(|| lead.get("chimera_income").and_then(|v| v.as_f64()));

        let conf_age = confidence_age(age, &title);
        let conf_income = confidence_income(income, &title);
        let needs_vlm = conf_age < 0.7 || conf_income < 0.5;

        let mut sources = serde_json::Map::new();
        if age.is_some() {
            sources.insert(
                "age".into(),
                Json::String(if lead.get("chimera_age").is_some() { "chimera".into() } else { "census".into() }),
            );
        }
        if income.is_some() {
            sources.insert(
                "income".into(),
                Json::String(if lead.get("chimera_income").is_some() { "chimera".into() } else { "census".into() }),
            );
        }
        let source_metadata = Json::Object(serde_json::Map::from_iter([
            ("sources".to_string(), Json::Object(sources)),
            ("needs_vlm_check".to_string(), Json::Bool(needs_vlm)),
            ("title".to_string(), Json::String(title.clone())),
        ]));

        let record = GoldenRecord {
            linkedin_url: linkedin_url.to_string(),
            name: lead.name(),
            phone: lead.phone().map(str::to_string),
            email: lead.string("email").map(str::to_string),
            city: lead.string("city").map(str::to_string),
            state: lead.string("state").map(str::to_string),
            zipcode: lead.string("zipcode").map(str::to_string),
            age,
            income,
            dnc_status: lead.string("dnc_status").map(str::to_string),
            can_contact: lead.get("can_contact").and_then(|v| v.as_bool()),
            confidence_age: conf_age,
            confidence_income: conf_income,
            source_metadata,
        };

        self.sink.upsert(record).await.map_err(StationError::from)?;

        let mut out = LeadRecord::new();
        out.set("needs_vlm_check", needs_vlm);
        Ok((out, StopCondition::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn base_lead() -> LeadRecord {
        let mut lead = LeadRecord::new();
        lead.set("linkedinUrl", "https://linkedin.com/in/jdoe");
        lead.set("name", "Jane Doe");
        lead.set("title", "Junior Analyst");
        lead
    }

    #[tokio::test]
    async fn saves_and_flags_low_confidence_income() {
        let sink = Arc::new(InMemoryLeadSink::new());
        let station = DatabaseSaveStation::new(sink.clone());
        let mut lead = base_lead();
        lead.set("chimera_income", 150_000.0);
        lead.set("income", 150_000.0);
        let ctx = PipelineContext::new(lead, 5.0);
        let (delta, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Continue));
        assert_eq!(delta.get("needs_vlm_check").and_then(|v| v.as_bool()), Some(true));
        let stored = sink.get("https://linkedin.com/in/jdoe").unwrap();
        assert_eq!(stored.confidence_income, 0.3);
    }

    #[tokio::test]
    async fn missing_linkedin_url_fails() {
        let sink = Arc::new(InMemoryLeadSink::new());
        let station = DatabaseSaveStation::new(sink);
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let (_, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Fail(_)));
    }

    #[tokio::test]
    async fn second_save_coalesces_nulls_without_overwriting() {
        let sink = Arc::new(InMemoryLeadSink::new());
        let station = DatabaseSaveStation::new(sink.clone());

        let mut first = base_lead();
        first.set("phone", "+15551234567");
        station.process(&PipelineContext::new(first, 5.0)).await.unwrap();

        let second = base_lead();
        station.process(&PipelineContext::new(second, 5.0)).await.unwrap();

        let stored = sink.get("https://linkedin.com/in/jdoe").unwrap();
        assert_eq!(stored.phone.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn retiree_title_keeps_full_confidence() {
        assert_eq!(confidence_age(Some(65.0), "Retired Executive"), 1.0);
        assert_eq!(confidence_age(Some(65.0), "Executive"), 0.6);
    }
}
