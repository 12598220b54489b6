use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::WorkerError;

/// On-disk shape of the worker's TOML config file. Every field is optional —
/// an absent file or an absent field simply falls through to
/// [`WorkerConfig`]'s defaults, which are then layered over by environment
/// variables. A permissive `Deserialize` struct of `Option<T>`s, resolved
/// into a fully-populated config type the rest of the crate actually uses.
///
/// # Example
/// ```toml
/// redis_url = "redis://127.0.0.1:6379"
/// pipeline_name = "core"
/// budget_limit = 8.0
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerTomlConfig {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub budget_limit: Option<f64>,
    #[serde(default)]
    pub chimera_station_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub mission_queue: Option<String>,
    #[serde(default)]
    pub mission_dlq: Option<String>,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_backoff_base_seconds: Option<u64>,
    #[serde(default)]
    pub run_registry_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub step_timeout_seconds: Option<u64>,
}

/// Fully resolved worker configuration: TOML file values layered over
/// defaults, then overridden by environment variables
/// (which always win — an operator setting `PIPELINE_BUDGET_LIMIT` in the
/// shell expects it to take effect regardless of what's checked into the
/// config file).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub database_url: Option<String>,
    /// Selects the station route `goldrecord_worker::route::build_route`
    /// returns. `"default"` is the full route; see that module for the
    /// other recognized names.
    pub pipeline_name: String,
    pub budget_limit: f64,
    pub chimera_station_timeout: Duration,
    pub webhook_url: Option<String>,
    pub mission_queue: String,
    pub mission_dlq: String,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_backoff_base: Duration,
    pub run_registry_ttl: Duration,
    /// Per-station timeout passed to `goldrecord_pipeline::run_pipeline`.
    /// `None` (the default): stations manage their own
    /// deadlines (Chimera's mission BRPOP, Telnyx's HTTP timeout, ...)
    /// rather than the engine imposing a blanket one.
    pub step_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: None,
            pipeline_name: "default".to_string(),
            budget_limit: 5.0,
            chimera_station_timeout: Duration::from_secs(120),
            webhook_url: None,
            mission_queue: "chimera:missions".to_string(),
            mission_dlq: "chimera:missions:dlq".to_string(),
            max_concurrent: 10,
            max_retries: 3,
            retry_backoff_base: Duration::from_secs(5),
            run_registry_ttl: Duration::from_secs(3600),
            step_timeout: None,
        }
    }
}

impl WorkerConfig {
    /// Loads config from `path` if it exists (`acteon.toml`-style: missing
    /// file is not an error, just "use defaults"), then layers environment
    /// variables on top.
    pub fn load(path: &Path) -> Result<Self, WorkerError> {
        let toml_config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|source| WorkerError::ConfigRead { path: path.display().to_string(), source })?;
            toml::from_str(&contents)
                .map_err(|source| WorkerError::ConfigParse { path: path.display().to_string(), source })?
        } else {
            WorkerTomlConfig::default()
        };
        Ok(Self::resolve(toml_config))
    }

    pub fn resolve(toml_config: WorkerTomlConfig) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = toml_config.redis_url {
            cfg.redis_url = v;
        }
        cfg.database_url = toml_config.database_url;
        if let Some(v) = toml_config.pipeline_name {
            cfg.pipeline_name = v;
        }
        if let Some(v) = toml_config.budget_limit {
            cfg.budget_limit = v;
        }
        if let Some(v) = toml_config.chimera_station_timeout_seconds {
            cfg.chimera_station_timeout = Duration::from_secs(v);
        }
        if let Some(v) = toml_config.webhook_url {
            cfg.webhook_url = Some(v);
        }
        if let Some(v) = toml_config.mission_queue {
            cfg.mission_queue = v;
        }
        if let Some(v) = toml_config.mission_dlq {
            cfg.mission_dlq = v;
        }
        if let Some(v) = toml_config.max_concurrent {
            cfg.max_concurrent = v;
        }
        if let Some(v) = toml_config.max_retries {
            cfg.max_retries = v;
        }
        if let Some(v) = toml_config.retry_backoff_base_seconds {
            cfg.retry_backoff_base = Duration::from_secs(v);
        }
        if let Some(v) = toml_config.run_registry_ttl_seconds {
            cfg.run_registry_ttl = Duration::from_secs(v);
        }
        if let Some(v) = toml_config.step_timeout_seconds {
            cfg.step_timeout = Some(Duration::from_secs(v));
        }
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("REDIS_URL").or_else(|_| env::var("APP_REDIS_URL")) {
            self.redis_url = v;
        }
        if let Ok(v) = env::var("DATABASE_URL").or_else(|_| env::var("APP_DATABASE_URL")) {
            self.database_url = Some(v);
        }
        if let Ok(v) = env::var("PIPELINE_NAME") {
            self.pipeline_name = v;
        }
        if let Ok(v) = env::var("PIPELINE_BUDGET_LIMIT")
            && let Ok(f) = v.parse()
        {
            self.budget_limit = f;
        }
        if let Ok(v) = env::var("CHIMERA_STATION_TIMEOUT")
            && let Ok(secs) = v.parse()
        {
            self.chimera_station_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = env::var("WEBHOOK_URL") {
            self.webhook_url = Some(v);
        }
        if let Ok(v) = env::var("CHIMERA_MISSION_QUEUE") {
            self.mission_queue = v;
        }
        if let Ok(v) = env::var("CHIMERA_MISSION_DLQ") {
            self.mission_dlq = v;
        }
    }
}
