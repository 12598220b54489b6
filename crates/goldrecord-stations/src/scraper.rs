use goldrecord_core::{EnrichError, LeadRecord, PipelineContext, Station, StopCondition};

/// Station: attempts free HTML-based extraction against people-search sites
/// using the blueprint the loader station attached to the record. Selector
/// execution against a live page is out of scope here (no headless browser
/// in this crate's dependency stack); this is the stub that keeps the slot
/// in the route non-fatal and free, matching the upstream "non-critical,
/// errors swallowed" posture.
#[derive(Default)]
pub struct ScraperEnrichmentStation;

impl Station for ScraperEnrichmentStation {
    fn name(&self) -> &str {
        "Scraper Enrichment"
    }

    fn required_inputs(&self) -> &[&str] {
        &["_blueprint"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &[]
    }

    fn cost_estimate(&self) -> f64 {
        0.0
    }

    async fn process(&self, _ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        Ok((LeadRecord::new(), StopCondition::Continue))
    }
}
