use tracing::warn;

/// Fire-and-forget webhook POST. Never fails the caller — a dropped alert is
/// preferable to a pipeline run failing because an operator's webhook
/// endpoint is down. Mirrors the "build request, run, log on error, don't
/// propagate" posture of a generic outbound-integration `execute()`, inlined
/// here because this system has exactly two fixed payload shapes (pause,
/// provider blacklisted) rather than a configurable set of providers.
pub async fn notify_webhook(url: Option<&str>, body: serde_json::Value) {
    let Some(url) = url else {
        return;
    };
    let client = reqwest::Client::new();
    if let Err(err) = client.post(url).json(&body).send().await {
        warn!(%err, url, "webhook notification failed");
    }
}
