use goldrecord_core::{EnrichError, LeadRecord, PipelineContext, Station, StopCondition};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Station 1: resolves the raw name/location fields a lead arrives with
/// into structured identity (`firstName`, `lastName`, `city`, `state`,
/// `zipcode`). Free, and fails only when no name can be found at all.
pub struct IdentityResolutionStation;

impl Station for IdentityResolutionStation {
    fn name(&self) -> &str {
        "Identity Resolution"
    }

    fn required_inputs(&self) -> &[&str] {
        &["name"]
    }

    fn produces_outputs(&self) -> &[&str] {
        &["firstName", "lastName", "city", "state", "zipcode", "linkedinUrl", "company", "title"]
    }

    fn cost_estimate(&self) -> f64 {
        0.0
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<(LeadRecord, StopCondition), EnrichError> {
        let data = ctx.data();
        let raw_name = data
            .string("name")
            .or_else(|| data.string("fullName"))
            .unwrap_or_default();
        let name = if raw_name.is_empty() {
            let first = data.string("firstName").unwrap_or_default();
            let last = data.string("lastName").unwrap_or_default();
            format!("{first} {last}").trim().to_string()
        } else {
            clean_name(raw_name)
        };

        let (first_name, last_name) = parse_name(&name);
        if first_name.is_empty() || last_name.is_empty() {
            warn!(%name, "Identity Resolution: missing firstName or lastName");
            return Ok((LeadRecord::new(), StopCondition::Fail(
                goldrecord_core::FailureDetail::new("missing firstName or lastName")
                    .with_fix("ensure name and linkedinUrl (or equivalent) are present in the lead"),
            )));
        }

        let (city, state, zipcode) = parse_location(data.string("location").unwrap_or_default());

        let mut out = LeadRecord::new();
        out.set("firstName", first_name.clone());
        out.set("lastName", last_name.clone());
        out.set("fullName", name);
        out.set("city", city);
        out.set("state", state);
        out.set("zipcode", zipcode);
        if let Some(company) = data.company() {
            out.set("company", company);
        }
        if let Some(title) = data.title() {
            out.set("title", title);
        }
        if let Some(url) = data.linkedin_url() {
            out.set("linkedinUrl", url);
        }
        info!(%first_name, %last_name, "identity resolved");
        Ok((out, StopCondition::Continue))
    }
}

fn clean_name(name: &str) -> String {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    static PAREN: OnceLock<Regex> = OnceLock::new();
    static TRAILER: OnceLock<Regex> = OnceLock::new();
    let suffix = SUFFIX.get_or_init(|| {
        Regex::new(r"(?i),?\s*(PhD|Ph\.D|MD|M\.D|MBA|CPA|Esq|Jr|Sr|III|II|IV)\.?$").unwrap()
    });
    let paren = PAREN.get_or_init(|| Regex::new(r"\s*\([^)]+\)$").unwrap());
    let trailer = TRAILER.get_or_init(|| Regex::new(r"\s*[|-]\s*.+$").unwrap());

    let mut cleaned = name.trim().to_string();
    cleaned = suffix.replace(&cleaned, "").to_string();
    cleaned = paren.replace(&cleaned, "").to_string();
    cleaned = trailer.replace(&cleaned, "").to_string();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "John Smith" -> ("John", "Smith"); "Mary Jane Watson" -> ("Mary", "Jane Watson").
fn parse_name(name: &str) -> (String, String) {
    let parts: Vec<&str> = name.trim().split_whitespace().collect();
    match parts.len() {
        0 => (String::new(), String::new()),
        1 => (parts[0].to_string(), String::new()),
        _ => (parts[0].to_string(), parts[1..].join(" ")),
    }
}

/// "Naples, Florida, United States" -> ("Naples", "FL", ""); "Naples, FL 34101" -> ("Naples", "FL", "34101").
fn parse_location(location: &str) -> (String, String, String) {
    if location.is_empty() {
        return (String::new(), String::new(), String::new());
    }
    static US_SUFFIX: OnceLock<Regex> = OnceLock::new();
    static ZIP: OnceLock<Regex> = OnceLock::new();
    let us_suffix = US_SUFFIX.get_or_init(|| Regex::new(r"(?i),\s*United\s+States$").unwrap());
    let zip = ZIP.get_or_init(|| Regex::new(r"\b(\d{5})\b").unwrap());

    let location = us_suffix.replace(location, "").to_string();
    let zipcode = zip.captures(&location).map(|c| c[1].to_string()).unwrap_or_default();
    let cleaned = zip.replace(&location, "").trim().to_string();

    let parts: Vec<String> = cleaned.split(',').map(|p| p.trim().to_string()).collect();
    match parts.len() {
        n if n >= 2 => {
            let city = parts[0].clone();
            let state = normalize_state(&parts[1]);
            (city, state, zipcode)
        }
        1 => {
            static STATE_TOKEN: OnceLock<Regex> = OnceLock::new();
            let state_token = STATE_TOKEN.get_or_init(|| Regex::new(r"\b([A-Z]{2})\b").unwrap());
            if let Some(m) = state_token.captures(&parts[0]) {
                let state = m[1].to_string();
                let city = parts[0].replace(&state, "").trim().trim_end_matches(',').trim().to_string();
                (city, state, zipcode)
            } else {
                (parts[0].clone(), String::new(), zipcode)
            }
        }
        _ => (String::new(), String::new(), zipcode),
    }
}

fn normalize_state(state: &str) -> String {
    let trimmed = state.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_uppercase()) {
        return trimmed.to_string();
    }
    match trimmed.to_lowercase().as_str() {
        "alabama" => "AL", "alaska" => "AK", "arizona" => "AZ", "arkansas" => "AR",
        "california" => "CA", "colorado" => "CO", "connecticut" => "CT", "delaware" => "DE",
        "florida" => "FL", "georgia" => "GA", "hawaii" => "HI", "idaho" => "ID",
        "illinois" => "IL", "indiana" => "IN", "iowa" => "IA", "kansas" => "KS",
        "kentucky" => "KY", "louisiana" => "LA", "maine" => "ME", "maryland" => "MD",
        "massachusetts" => "MA", "michigan" => "MI", "minnesota" => "MN", "mississippi" => "MS",
        "missouri" => "MO", "montana" => "MT", "nebraska" => "NE", "nevada" => "NV",
        "new hampshire" => "NH", "new jersey" => "NJ", "new mexico" => "NM", "new york" => "NY",
        "north carolina" => "NC", "north dakota" => "ND", "ohio" => "OH", "oklahoma" => "OK",
        "oregon" => "OR", "pennsylvania" => "PA", "rhode island" => "RI", "south carolina" => "SC",
        "south dakota" => "SD", "tennessee" => "TN", "texas" => "TX", "utah" => "UT",
        "vermont" => "VT", "virginia" => "VA", "washington" => "WA", "west virginia" => "WV",
        "wisconsin" => "WI", "wyoming" => "WY", "district of columbia" => "DC",
        _ => return trimmed.to_uppercase().chars().take(2).collect(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_first_and_last_name() {
        let mut data = LeadRecord::new();
        data.set("name", "John Smith");
        let ctx = PipelineContext::new(data, 5.0);
        let station = IdentityResolutionStation;
        let (delta, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Continue));
        assert_eq!(delta.string("firstName"), Some("John"));
        assert_eq!(delta.string("lastName"), Some("Smith"));
    }

    #[tokio::test]
    async fn parses_location_with_zip() {
        let mut data = LeadRecord::new();
        data.set("name", "Jane Doe");
        data.set("location", "Naples, FL 34101");
        let ctx = PipelineContext::new(data, 5.0);
        let station = IdentityResolutionStation;
        let (delta, _) = station.process(&ctx).await.unwrap();
        assert_eq!(delta.string("city"), Some("Naples"));
        assert_eq!(delta.string("state"), Some("FL"));
        assert_eq!(delta.string("zipcode"), Some("34101"));
    }

    #[tokio::test]
    async fn normalizes_full_state_name() {
        let mut data = LeadRecord::new();
        data.set("name", "Jane Doe");
        data.set("location", "Naples, Florida, United States");
        let ctx = PipelineContext::new(data, 5.0);
        let station = IdentityResolutionStation;
        let (delta, _) = station.process(&ctx).await.unwrap();
        assert_eq!(delta.string("state"), Some("FL"));
        assert_eq!(delta.string("zipcode"), Some(""));
    }

    #[tokio::test]
    async fn missing_name_fails() {
        let ctx = PipelineContext::new(LeadRecord::new(), 5.0);
        let station = IdentityResolutionStation;
        let (_, stop) = station.process(&ctx).await.unwrap();
        assert!(matches!(stop, StopCondition::Fail(_)));
    }

    #[test]
    fn strips_credential_suffixes() {
        assert_eq!(clean_name("Jane Doe, PhD"), "Jane Doe");
        assert_eq!(clean_name("Jane Doe (She/Her)"), "Jane Doe");
        assert_eq!(clean_name("Jane Doe | Acme Corp"), "Jane Doe");
    }
}
