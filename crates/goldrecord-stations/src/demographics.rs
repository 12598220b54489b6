use std::sync::Arc;

use async_trait::async_trait;
use goldrecord_core::{EnrichError, LeadRecord, PipelineContext, Station, StopCondition};
use serde_json::Value as Json;
use tracing::warn;

use crate::error::StationError;

const CENSUS_API_BASE: &str = "https://api.census.gov/data/2021/acs/acs5";

#[derive(Debug, Clone, Default)]
pub struct ZipDemographics {
    pub median_household_income: Option<f64>,
    pub population: Option<f64>,
}

/// Census lookup by zipcode, abstracted so the station can be tested without
/// a live network call.
#[async_trait]
pub trait CensusClient: Send + Sync {
    async fn lookup(&self, zipcode: &str) -> Result<ZipDemographics, StationError>;
}

pub struct PublicCensusClient {
    client: reqwest::Client,
}

impl PublicCensusClient {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for PublicCensusClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CensusClient for PublicCensusClient {
    async fn lookup(&self, zipcode: &str) -> Result<ZipDemographics, StationError> {
        let response = self
            .client
            .get(CENSUS_API_BASE)
            .query(&[("get", "B19013_001E,B01003_001E"), ("for", &format!("zip code tabulation area:{zipcode}"))])
            .send()
            .await?
            .error_for_status()?;
        let rows: Vec<Vec<Json>> = response.json().await?;
        let values = rows
            .get(1)
            .ok_or_else(|| StationError::sink("census response had no data row"))?;
        let parse = |idx: usize| values.get(idx).and_then(Json::as_str).and_then(|s| s.parse::<f64>().ok());
        Ok(ZipDemographics { median_household_income: parse(0), population: parse(1) })
    }
}

/// Station: best-effort census enrichment by zipcode. Never fails the
/// route — a lookup miss or transport error just means the lead goes
/// forward without demographic context.
pub struct DemographicsStation {
    client: Arc<dyn CensusClient>,
}

impl DemographicsStation {
    pub fn new(client: Arc<dyn CensusClient>) -> Self {
        Self { client }
    }
}

impl Default for DemographicsStation {
    fn default() -> Self {
        Self::new(Arc::new(PublicCensusClient::new()))
    }
}

impl Station for DemographicsStation {
    fn name(&self) -> &str {
        "Demographics"
    }

    fn required_inputs(&self) -> &[&str] {
        &["zipcode"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &["median_household_income", "zip_population"]
    }

    fn cost_estimate(&self) -> f64 {
        0.01
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        let lead = ctx.data();
        let Some(zipcode) = lead.string("zipcode").filter(|z| !z.is_empty()) else {
            return Ok((LeadRecord::new(), StopCondition::Continue));
        };

        let mut out = LeadRecord::new();
        match self.client.lookup(zipcode).await {
            Ok(demographics) => {
                if let Some(income) = demographics.median_household_income {
                    out.set("median_household_income", income);
                }
                if let Some(population) = demographics.population {
                    out.set("zip_population", population);
                }
            }
            Err(err) => {
                warn!(error = %err, "census lookup failed, continuing without demographics");
            }
        }
        Ok((out, StopCondition::Continue))
    }
}
