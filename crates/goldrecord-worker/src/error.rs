use thiserror::Error;

/// Crate-boundary error for the worker binary: config loading, KV
/// round-trips that back the run registry, and the bits of JSON (de)coding
/// that sit outside the pipeline/station crates.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse { path: String, source: toml::de::Error },

    #[error("kv error: {0}")]
    Kv(#[from] goldrecord_kv::KvError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
