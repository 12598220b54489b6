use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A single field of a lead record. Stations pass these around as loosely
/// typed deltas; the well-known accessors on [`LeadRecord`] narrow them back
/// to a concrete shape where callers need one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeadValue {
    String(String),
    Number(f64),
    Bool(bool),
    Json(Json),
}

impl LeadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LeadValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LeadValue::Number(n) => Some(*n),
            LeadValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LeadValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn into_json(self) -> Json {
        match self {
            LeadValue::String(s) => Json::String(s),
            LeadValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            LeadValue::Bool(b) => Json::Bool(b),
            LeadValue::Json(j) => j,
        }
    }

    fn from_json(value: Json) -> Self {
        match value {
            Json::String(s) => LeadValue::String(s),
            Json::Number(n) => LeadValue::Number(n.as_f64().unwrap_or(0.0)),
            Json::Bool(b) => LeadValue::Bool(b),
            other => LeadValue::Json(other),
        }
    }
}

impl From<&str> for LeadValue {
    fn from(value: &str) -> Self {
        LeadValue::String(value.to_string())
    }
}

impl From<String> for LeadValue {
    fn from(value: String) -> Self {
        LeadValue::String(value)
    }
}

impl From<f64> for LeadValue {
    fn from(value: f64) -> Self {
        LeadValue::Number(value)
    }
}

impl From<bool> for LeadValue {
    fn from(value: bool) -> Self {
        LeadValue::Bool(value)
    }
}

/// The lead record passed between stations: an untyped map plus a handful of
/// well-known accessors for the fields nearly every station reads.
///
/// Modeled as a tagged-variant map rather than a fixed struct so that new
/// station output keys never require a schema migration — stations declare
/// the keys they need and produce via `required_inputs`/`produces_outputs`
/// and the pipeline engine checks those sets, not a compiled type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadRecord {
    #[serde(flatten)]
    fields: HashMap<String, LeadValue>,
}

impl LeadRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: Json) -> Self {
        let mut fields = HashMap::new();
        if let Json::Object(map) = value {
            for (k, v) in map {
                fields.insert(k, LeadValue::from_json(v));
            }
        }
        Self { fields }
    }

    pub fn to_json(&self) -> Json {
        let map = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_json()))
            .collect();
        Json::Object(map)
    }

    pub fn get(&self, key: &str) -> Option<&LeadValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.get(key).is_some()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<LeadValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<LeadValue> {
        self.fields.remove(key)
    }

    /// Merges `delta` into this record, overwriting any keys it shares.
    pub fn merge(&mut self, delta: LeadRecord) {
        for (k, v) in delta.fields {
            self.fields.insert(k, v);
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(LeadValue::as_str)
    }

    pub fn name(&self) -> Option<String> {
        if let Some(name) = self.string("name") {
            return Some(name.to_string());
        }
        if let Some(name) = self.string("fullName") {
            return Some(name.to_string());
        }
        match (self.string("firstName"), self.string("lastName")) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            _ => None,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        self.string("phone")
    }

    pub fn linkedin_url(&self) -> Option<&str> {
        self.string("linkedinUrl")
    }

    pub fn company(&self) -> Option<&str> {
        self.string("company")
    }

    pub fn title(&self) -> Option<&str> {
        self.string("title")
    }

    /// A lead is "high-value" when both company and title are populated;
    /// only these leads are eligible for cross-source corroboration.
    pub fn is_high_value(&self) -> bool {
        !self.company().unwrap_or_default().is_empty() && !self.title().unwrap_or_default().is_empty()
    }
}
