//! The GPS provider router: picks which people-search provider handles a
//! lead, tracks per-provider and per-carrier health, and guards against a
//! poisoned provider flooding leads with a single fabricated value.

mod consensus;
mod error;
mod health_store;
mod magazine;
mod poison;
mod router;
mod webhook;

pub use consensus::{needs_olmocr_verification, normalize_phone, results_differ_significantly, VISION_CONFIDENCE_THRESHOLD};
pub use error::RouterError;
pub use health_store::HealthStore;
pub use magazine::{default_provider, domain_for_provider, MAGAZINE};
pub use poison::PoisonTracker;
pub use router::GpsRouter;
pub use webhook::notify_webhook;
