//! Request-facing lifecycle service.
//!
//! Deploy, destroy, and validate are checked synchronously (identity,
//! input, ownership) and then handed to the [`JobPool`]. The caller gets a
//! job id at once; the job's outcome is recorded in the [`JobLedger`] and,
//! for successful work, in the deployment itself.

use std::sync::Arc;

use chalops_core::challenge::{validate_challenge_id, ChallengeSpec};
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::error::{CoreError, CoreResult};
use chalops_core::pipeline::JobKind;
use chalops_core::types::new_id;
use chalops_core::validation::validate_flag;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::ledger::{JobLedger, JobRecord, JobStatus};
use crate::orchestrator::{DeployIntent, DeploymentOrchestrator, DeploymentResults, DestroyOutcome};
use crate::pool::JobPool;

/// Response to an accepted lifecycle request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub job_id: String,
    /// Deployment the job acts on. For a deploy this is the id the
    /// deployment will have once provisioning succeeds.
    pub deployment_id: String,
    pub status: JobStatus,
}

pub struct LifecycleService {
    orchestrator: Arc<DeploymentOrchestrator>,
    pool: Arc<JobPool>,
    ledger: Arc<JobLedger>,
}

impl LifecycleService {
    pub fn new(
        orchestrator: Arc<DeploymentOrchestrator>,
        pool: Arc<JobPool>,
        ledger: Arc<JobLedger>,
    ) -> Self {
        Self {
            orchestrator,
            pool,
            ledger,
        }
    }

    pub fn orchestrator(&self) -> &Arc<DeploymentOrchestrator> {
        &self.orchestrator
    }

    pub async fn submit_deploy(&self, user_id: &str, spec: ChallengeSpec) -> CoreResult<Accepted> {
        let user_id = require_user(user_id)?;
        validate_challenge_id(&spec.id)?;

        let job_id = new_id();
        let deployment_id = new_id();
        let intent = DeployIntent {
            spec,
            user_id: user_id.to_string(),
            deployment_id: deployment_id.clone(),
            job_id: job_id.clone(),
        };

        let orchestrator = self.orchestrator.clone();
        let ledger = self.ledger.clone();
        self.enqueue(&job_id, JobKind::Deploy, user_id, &deployment_id, move |cancel| async move {
            let job_id = intent.job_id.clone();
            match orchestrator.deploy(&cancel, intent).await {
                Ok(deployment) => ledger.succeed(&job_id, Some(&deployment.id)),
                Err(err) => record_failure(&ledger, &job_id, JobKind::Deploy, &err),
            }
        })
    }

    pub async fn submit_destroy(&self, user_id: &str, deployment_id: &str) -> CoreResult<Accepted> {
        let user_id = require_user(user_id)?;
        let deployment = self.orchestrator.deployment(deployment_id, user_id).await?;
        if deployment.status == DeploymentStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Deployment {deployment_id} is still pending and cannot be destroyed yet"
            )));
        }

        let job_id = new_id();
        let orchestrator = self.orchestrator.clone();
        let ledger = self.ledger.clone();
        let owner = user_id.to_string();
        let id = deployment.id.clone();
        let job = job_id.clone();
        self.enqueue(&job_id, JobKind::Destroy, user_id, &deployment.id, move |cancel| async move {
            match orchestrator.destroy(&cancel, &id, &owner, &job).await {
                Ok(outcome) => ledger.succeed(&job, Some(&outcome.deployment().id)),
                Err(err) => record_failure(&ledger, &job, JobKind::Destroy, &err),
            }
        })
    }

    pub async fn submit_validate(
        &self,
        user_id: &str,
        deployment_id: &str,
        flag: &str,
    ) -> CoreResult<Accepted> {
        let user_id = require_user(user_id)?;
        validate_flag(flag)?;
        let deployment = self.orchestrator.deployment(deployment_id, user_id).await?;
        if deployment.status == DeploymentStatus::Destroyed {
            return Err(CoreError::Conflict(format!(
                "Deployment {deployment_id} is destroyed"
            )));
        }

        let job_id = new_id();
        let orchestrator = self.orchestrator.clone();
        let ledger = self.ledger.clone();
        let owner = user_id.to_string();
        let id = deployment.id.clone();
        let job = job_id.clone();
        let flag = flag.to_string();
        self.enqueue(&job_id, JobKind::Validate, user_id, &deployment.id, move |cancel| async move {
            match orchestrator.validate(&cancel, &id, &owner, &flag, &job).await {
                Ok(_) => ledger.succeed(&job, Some(&id)),
                Err(err) => record_failure(&ledger, &job, JobKind::Validate, &err),
            }
        })
    }

    /// Destroy inline. Succeeds for already destroyed deployments.
    pub async fn destroy_now(&self, user_id: &str, deployment_id: &str) -> CoreResult<DestroyOutcome> {
        let job_id = new_id();
        self.orchestrator
            .destroy(&CancellationToken::new(), deployment_id, user_id, &job_id)
            .await
    }

    pub async fn status(&self, user_id: &str, deployment_id: &str) -> CoreResult<Deployment> {
        self.orchestrator.get_status(deployment_id, user_id).await
    }

    pub async fn results(&self, user_id: &str, deployment_id: &str) -> CoreResult<DeploymentResults> {
        self.orchestrator.results(deployment_id, user_id).await
    }

    /// A job accepted for `user_id`. Other users' jobs are not found.
    pub fn job(&self, user_id: &str, job_id: &str) -> CoreResult<JobRecord> {
        let user_id = require_user(user_id)?;
        self.ledger
            .get(job_id)
            .filter(|record| record.user_id == user_id)
            .ok_or_else(|| CoreError::not_found("Job", job_id))
    }

    fn enqueue<F, Fut>(
        &self,
        job_id: &str,
        kind: JobKind,
        user_id: &str,
        deployment_id: &str,
        job: F,
    ) -> CoreResult<Accepted>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.ledger.open(job_id, kind, user_id, Some(deployment_id));
        if let Err(err) = self.pool.submit(job_id, job) {
            self.ledger.fail(job_id, &err);
            return Err(err);
        }
        tracing::info!(%job_id, %kind, %deployment_id, "Job accepted");
        Ok(Accepted {
            job_id: job_id.to_string(),
            deployment_id: deployment_id.to_string(),
            status: JobStatus::Pending,
        })
    }
}

fn require_user(user_id: &str) -> CoreResult<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(CoreError::Unauthorized("caller identity is required".into()));
    }
    Ok(user_id)
}

fn record_failure(ledger: &JobLedger, job_id: &str, kind: JobKind, err: &CoreError) {
    match err {
        CoreError::Dispatch(_) | CoreError::Persistence(_) | CoreError::Internal(_) => {
            tracing::error!(%job_id, %kind, error = %err, "Job failed");
        }
        _ => tracing::warn!(%job_id, %kind, error = %err, "Job failed"),
    }
    ledger.fail(job_id, err);
}
