use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::errors::PollingFailure;
use crate::transport::BackendClient;
use crate::types::{ConversionPhase, ConversionStatus};

const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum PollerEvent {
    Status(ConversionStatus),
    /// Sent once, a settle delay after the ready status. `cache_bust` is a
    /// millisecond timestamp for the manifest URL.
    AttachReady { resource: String, cache_bust: i64 },
}

/// Periodically probes the conversion status of one resource.
///
/// One probe runs immediately on [`start`](Self::start), then one per
/// interval until a terminal status. A single polling task exists per
/// poller; starting again replaces it.
pub struct ConversionStatusPoller {
    client: Arc<dyn BackendClient>,
    config: PollingConfig,
    resource: Option<String>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConversionStatusPoller {
    pub fn new(client: Arc<dyn BackendClient>, config: PollingConfig) -> Self {
        Self {
            client,
            config,
            resource: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Begin polling `resource_key`. The returned stream ends after a
    /// terminal status or when the poller is stopped.
    pub fn start(&mut self, resource_key: &str) -> ReceiverStream<PollerEvent> {
        self.stop();

        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        self.cancel = CancellationToken::new();
        self.resource = Some(resource_key.to_string());

        info!("Polling conversion status for {}", resource_key);
        self.task = Some(tokio::spawn(poll_until_terminal(
            self.client.clone(),
            self.config.clone(),
            resource_key.to_string(),
            tx,
            self.cancel.clone(),
        )));

        ReceiverStream::new(rx)
    }

    /// Cancel the pending timer and any in-flight probe. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            if let Some(resource) = self.resource.as_deref() {
                debug!("Stopped polling {}", resource);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}

impl Drop for ConversionStatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn probe(client: &dyn BackendClient, resource: &str) -> ConversionStatus {
    match client.fetch_status(resource).await {
        Ok(response) => ConversionStatus::from_response(&response).unwrap_or_else(|failure| {
            warn!("Malformed status for {}: {}", resource, failure);
            ConversionStatus::failed(failure)
        }),
        Err(e) => {
            warn!("Status probe for {} failed: {}", resource, e);
            ConversionStatus::failed(PollingFailure::Unreachable(e))
        }
    }
}

/// Non-terminal progress never moves backwards; a lower reading repeats
/// the last one.
fn monotonic(status: ConversionStatus, last: &Option<ConversionStatus>) -> ConversionStatus {
    match last {
        Some(prev) if !status.is_terminal() && status.progress < prev.progress => prev.clone(),
        _ => status,
    }
}

async fn poll_until_terminal(
    client: Arc<dyn BackendClient>,
    config: PollingConfig,
    resource: String,
    tx: mpsc::Sender<PollerEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<ConversionStatus> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return,
            status = probe(client.as_ref(), &resource) => status,
        };
        let status = monotonic(status, &last);
        let phase = status.phase;
        debug!("{}: {:?} {}%", resource, phase, status.progress);

        last = Some(status.clone());
        if tx.send(PollerEvent::Status(status)).await.is_err() {
            return;
        }

        match phase {
            ConversionPhase::Ready => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(config.ready_settle_delay) => {}
                }
                let cache_bust = chrono::Utc::now().timestamp_millis();
                info!("{} is ready to attach", resource);
                let _ = tx
                    .send(PollerEvent::AttachReady {
                        resource: resource.clone(),
                        cache_bust,
                    })
                    .await;
                return;
            }
            ConversionPhase::Error => return,
            _ => {}
        }
    }
}
