use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use goldrecord_kv::KvStore;
use goldrecord_kv_redis::{RedisBackend, RedisConfig};
use goldrecord_stations::InMemoryLeadSink;
use goldrecord_worker::{build_route, logging, QueueWorker, RunRegistry, WorkerConfig};
use tracing::info;

/// Golden Record enrichment worker: pulls leads off `leads_to_enrich`, runs
/// them through the configured station route, and writes results to the
/// configured database sink.
#[derive(Parser, Debug)]
#[command(name = "goldrecord-worker", about = "Queue worker for the Golden Record enrichment pipeline")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "goldrecord.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let cli = Cli::parse();
    let config = WorkerConfig::load(&cli.config)?;
    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config.display(), "config file not found, using defaults layered with environment overrides");
    }

    let redis_config = RedisConfig::new(config.redis_url.clone());
    let kv: Arc<dyn KvStore> = Arc::new(RedisBackend::new(&redis_config)?);

    // The database sink this binary ships with is an in-memory stand-in;
    // a production deployment wires a real `LeadSink` (e.g. a Postgres- or
    // ClickHouse-backed one) behind the same trait before building the route.
    let sink = Arc::new(InMemoryLeadSink::new());
    let route = build_route(&config, kv.clone(), sink);

    let registry = Arc::new(RunRegistry::new(kv.clone(), config.run_registry_ttl));
    let worker = QueueWorker::new(kv, route, registry, config);

    worker.run().await
}
