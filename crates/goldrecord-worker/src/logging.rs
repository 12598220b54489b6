use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a plain `fmt` + `EnvFilter` subscriber (`RUST_LOG`-driven,
/// defaulting to `info`). No OpenTelemetry/OTLP layer: the worker is a
/// standalone queue consumer, not a request-serving component, so there is
/// no distributed trace to join — see `DESIGN.md` for the full rationale.
pub fn init() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
