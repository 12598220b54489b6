use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use goldrecord_core::{ProgressEvent, ProgressSink, RunRecord, RunStatus};
use goldrecord_kv::KvStore;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::error::WorkerError;

fn run_key(run_id: &str) -> String {
    format!("enrich:run:{run_id}")
}

/// Background-run state keyed on `enrich:run:{run_id}`, TTLed so a run
/// record (1 hour from last update by default) does not linger forever.
/// Clients behind proxies that can't hold an open NDJSON connection poll
/// [`RunRegistry::get`] instead.
pub struct RunRegistry {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl RunRegistry {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub async fn create(&self, run_id: &str) -> Result<(), WorkerError> {
        self.write(run_id, &RunRecord::new_running(Utc::now())).await
    }

    pub async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, WorkerError> {
        match self.kv.get(&run_key(run_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn record_progress(&self, run_id: &str, event: ProgressEvent) -> Result<(), WorkerError> {
        let mut record = self.get(run_id).await?.unwrap_or_else(|| RunRecord::new_running(Utc::now()));
        record.progress = Some(event);
        record.updated_at = Utc::now();
        self.write(run_id, &record).await
    }

    pub async fn record_final(&self, run_id: &str, event: ProgressEvent, error: Option<String>) -> Result<(), WorkerError> {
        let mut record = self.get(run_id).await?.unwrap_or_else(|| RunRecord::new_running(Utc::now()));
        record.status = if error.is_some() { RunStatus::Error } else { RunStatus::Done };
        record.result = Some(event);
        record.error = error;
        record.updated_at = Utc::now();
        self.write(run_id, &record).await
    }

    async fn write(&self, run_id: &str, record: &RunRecord) -> Result<(), WorkerError> {
        let json = serde_json::to_string(record)?;
        self.kv.set(&run_key(run_id), &json, Some(self.ttl)).await?;
        Ok(())
    }
}

/// Implements [`ProgressSink`] by forwarding every event, synchronously and
/// without blocking, onto an unbounded channel a background task drains.
/// `emit` is a plain (non-async) trait method; the draining task is where
/// the actually-async KV write and the live broadcast happen.
struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ProgressEvent) {
        // A closed receiver (run already finished draining) is not an error
        // worth logging — it just means nobody's listening anymore.
        let _ = self.tx.send(event);
    }
}

/// Handle to a pipeline run kicked off in the background: its id, and a
/// broadcast channel live NDJSON subscribers can attach to immediately
/// (before the run has produced its first event).
pub struct RunHandle {
    pub run_id: String,
    pub stream: broadcast::Sender<ProgressEvent>,
}

/// Builds a progress sink for `run_id` plus the plumbing that mirrors every
/// event the pipeline emits into both the run registry (for polling
/// clients) and a broadcast channel (for live NDJSON subscribers). Returns
/// the sink to attach to a `PipelineContext` and the handle callers keep
/// around to subscribe to the stream or to await the drain task's
/// completion.
pub fn attach(registry: Arc<RunRegistry>, run_id: impl Into<String>, buffer: usize) -> (Arc<dyn ProgressSink>, RunHandle) {
    let run_id = run_id.into();
    let (stream_tx, _rx) = broadcast::channel(buffer.max(1));
    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<ProgressEvent>();

    let drain_run_id = run_id.clone();
    let drain_stream_tx = stream_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = ev_rx.recv().await {
            let _ = drain_stream_tx.send(event.clone());
            if let Err(err) = registry.record_progress(&drain_run_id, event).await {
                warn!(run_id = %drain_run_id, %err, "failed to mirror progress event into run registry");
            }
        }
    });

    let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgressSink { tx: ev_tx });
    (sink, RunHandle { run_id, stream: stream_tx })
}

#[cfg(test)]
mod tests {
    use goldrecord_kv::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let kv = Arc::new(MemoryBackend::new());
        let registry = RunRegistry::new(kv, Duration::from_secs(60));
        registry.create("run-1").await.unwrap();
        let record = registry.get("run-1").await.unwrap().unwrap();
        assert!(matches!(record.status, RunStatus::Running));
        assert!(record.progress.is_none());
    }

    #[tokio::test]
    async fn record_final_marks_done_on_success() {
        let kv = Arc::new(MemoryBackend::new());
        let registry = RunRegistry::new(kv, Duration::from_secs(60));
        registry.create("run-2").await.unwrap();
        let event = ProgressEvent::Final {
            success: true,
            failure_mode: None,
            failure_at: None,
            hint: None,
            data: serde_json::json!({"phone": "+15551234567"}),
        };
        registry.record_final("run-2", event, None).await.unwrap();
        let record = registry.get("run-2").await.unwrap().unwrap();
        assert!(matches!(record.status, RunStatus::Done));
        assert!(record.result.is_some());
    }

    #[tokio::test]
    async fn record_final_marks_error_when_error_text_present() {
        let kv = Arc::new(MemoryBackend::new());
        let registry = RunRegistry::new(kv, Duration::from_secs(60));
        registry.create("run-3").await.unwrap();
        let event = ProgressEvent::Final {
            success: false,
            failure_mode: None,
            failure_at: None,
            hint: None,
            data: serde_json::json!({}),
        };
        registry.record_final("run-3", event, Some("budget exhausted".to_string())).await.unwrap();
        let record = registry.get("run-3").await.unwrap().unwrap();
        assert!(matches!(record.status, RunStatus::Error));
        assert_eq!(record.error.as_deref(), Some("budget exhausted"));
    }

    #[tokio::test]
    async fn attach_mirrors_emitted_events_into_registry_and_stream() {
        let kv = Arc::new(MemoryBackend::new());
        let registry = Arc::new(RunRegistry::new(kv, Duration::from_secs(60)));
        registry.create("run-4").await.unwrap();
        let (sink, handle) = attach(registry.clone(), "run-4", 16);
        let mut rx = handle.stream.subscribe();

        sink.emit(ProgressEvent::Running { step: 1, total: 3, pct: 33.3, station: "Identity Resolution".to_string() });

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(received, ProgressEvent::Running { .. }));

        // give the drain task a moment to reach the registry write
        for _ in 0..50 {
            if registry.get("run-4").await.unwrap().unwrap().progress.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let record = registry.get("run-4").await.unwrap().unwrap();
        assert!(record.progress.is_some());
    }
}
