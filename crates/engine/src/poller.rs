//! Periodic reconciliation for deployments whose callback never arrived.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::orchestrator::DeploymentOrchestrator;

pub struct StatusPoller {
    orchestrator: Arc<DeploymentOrchestrator>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(orchestrator: Arc<DeploymentOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Status poller started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Status poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once(&cancel).await;
                }
            }
        }
    }

    /// Refresh every pending or running deployment once. Returns how many
    /// changed status.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> usize {
        let deployments = match self.orchestrator.transient_deployments().await {
            Ok(deployments) => deployments,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list deployments to poll");
                return 0;
            }
        };

        let mut changed = 0;
        for deployment in deployments {
            if cancel.is_cancelled() {
                break;
            }
            let id = deployment.id.clone();
            let before = deployment.status;
            match self.orchestrator.refresh_status(deployment).await {
                Ok(refreshed) if refreshed.status != before => changed += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(deployment_id = %id, error = %e, "Status refresh failed");
                }
            }
        }
        if changed > 0 {
            tracing::info!(changed, "Status poll applied changes");
        }
        changed
    }
}
