//! Station implementations for the enrichment route: identity resolution,
//! blueprint loading, the Chimera mission dispatcher, skip-tracing,
//! gatekeeping and scrubbing stations, and the final database save.

mod blueprint_loader;
mod chimera;
mod database;
mod demographics;
mod dnc;
mod error;
mod identity;
mod scraper;
mod skip_tracing;
mod telnyx;

pub use blueprint_loader::BlueprintLoaderStation;
pub use chimera::ChimeraStation;
pub use database::{DatabaseSaveStation, InMemoryLeadSink, LeadSink};
pub use demographics::DemographicsStation;
pub use dnc::DncGatekeeperStation;
pub use error::StationError;
pub use identity::IdentityResolutionStation;
pub use scraper::ScraperEnrichmentStation;
pub use skip_tracing::SkipTracingStation;
pub use telnyx::TelnyxGatekeepStation;
