use goldrecord_core::{EnrichError, LeadRecord, PipelineContext, Station, StopCondition};

/// Station: Do-Not-Call scrubbing seam. Always reports the lead as
/// contactable without calling out to a real DNC registry — no working
/// integration survived retrieval, so this preserves the seam (inputs,
/// outputs, cost) rather than inventing a provider.
pub struct DncGatekeeperStation;

impl Station for DncGatekeeperStation {
    fn name(&self) -> &str {
        "DNC Scrubbing"
    }

    fn required_inputs(&self) -> &[&str] {
        &[]
    }

    fn produces_outputs(&self) -> &[&str] {
        &["dnc_status", "can_contact"]
    }

    fn cost_estimate(&self) -> f64 {
        0.0
    }

    async fn process(&self, _ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        let mut out = LeadRecord::new();
        out.set("dnc_status", "SKIPPED");
        out.set("can_contact", true);
        Ok((out, StopCondition::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_reports_contactable() {
        let station = DncGatekeeperStation;
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let (delta, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Continue));
        assert_eq!(delta.string("dnc_status"), Some("SKIPPED"));
        assert_eq!(delta.get("can_contact").and_then(|v| v.as_bool()), Some(true));
    }
}
