use goldrecord_core::EnrichError;
use goldrecord_kv::KvError;
use goldrecord_router::RouterError;
use thiserror::Error;

/// Crate-boundary error for everything below the `Station` trait's own
/// `EnrichError` surface: the router/KV calls a station makes internally,
/// and the HTTP calls out to validation/enrichment APIs. Stations convert
/// this into an `EnrichError` at their `process` boundary rather than
/// leaking `reqwest`/`redis` types upward.
#[derive(Debug, Error)]
pub enum StationError {
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    #[error("kv error: {0}")]
    Kv(#[from] KvError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Sink { message: String },
}

impl StationError {
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink { message: message.into() }
    }
}

impl From<StationError> for EnrichError {
    fn from(value: StationError) -> Self {
        EnrichError::TerminalStationError(value.to_string())
    }
}
