//! Background consumer that drains a [`CompletionQueue`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chalops_core::error::CoreError;
use tokio_util::sync::CancellationToken;

use crate::queue::{ClaimedEvent, CompletionEvent, CompletionQueue};

/// Interval between queue polls when the queue is empty.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Processes one completion event.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn handle(&self, event: &CompletionEvent) -> Result<(), CoreError>;
}

/// Poll loop: claim, handle, then ack or nack.
pub struct CompletionConsumer {
    queue: Arc<dyn CompletionQueue>,
    handler: Arc<dyn CompletionHandler>,
    poll_interval: Duration,
}

impl CompletionConsumer {
    pub fn new(queue: Arc<dyn CompletionQueue>, handler: Arc<dyn CompletionHandler>) -> Self {
        Self {
            queue,
            handler,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until `cancel` fires. Each tick drains every available event.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_ms = self.poll_interval.as_millis() as u64, "Completion consumer started");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Completion consumer cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.drain(&cancel).await;
                }
            }
        }
    }

    /// Handle events until the queue is empty or `cancel` fires.
    /// Returns the number of events processed.
    pub async fn drain(&self, cancel: &CancellationToken) -> usize {
        let mut processed = 0;
        while !cancel.is_cancelled() {
            match self.queue.claim().await {
                Ok(Some(claimed)) => {
                    self.process(&claimed).await;
                    processed += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim completion event");
                    break;
                }
            }
        }
        processed
    }

    async fn process(&self, claimed: &ClaimedEvent) {
        let deployment_id = &claimed.event.deployment_id;
        match self.handler.handle(&claimed.event).await {
            Ok(()) => {
                if let Err(e) = self.queue.ack(claimed).await {
                    tracing::error!(error = %e, %deployment_id, "Failed to ack completion event");
                }
            }
            Err(CoreError::NotFound { .. }) => {
                // Retrying cannot make an unknown deployment appear.
                tracing::warn!(%deployment_id, "Completion event for unknown deployment dropped");
                if let Err(e) = self.queue.ack(claimed).await {
                    tracing::error!(error = %e, %deployment_id, "Failed to ack completion event");
                }
            }
            Err(err) => {
                let message = err.to_string();
                match self.queue.nack(claimed, &message).await {
                    Ok(true) => tracing::warn!(
                        %deployment_id,
                        attempts = claimed.attempts,
                        error = %message,
                        "Completion event failed, will retry"
                    ),
                    Ok(false) => tracing::error!(
                        %deployment_id,
                        attempts = claimed.attempts,
                        error = %message,
                        "Completion event failed permanently"
                    ),
                    Err(e) => {
                        tracing::error!(error = %e, %deployment_id, "Failed to nack completion event")
                    }
                }
            }
        }
    }
}
