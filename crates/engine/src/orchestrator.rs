//! Deployment orchestrator: the only component that changes deployment
//! status.
//!
//! Every operation that calls an external capability and then records a
//! consequence performs the external call first. If the follow-up write
//! fails the error is returned, but the external side effect stands.

use std::sync::Arc;

use chalops_core::challenge::{validate_challenge_id, Challenge, ChallengeSpec, ChallengeStatus};
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::error::{CoreError, CoreResult};
use chalops_core::ports::{
    ChallengeDeployer, DeployRequest, JobHandle, ValidationRequest, ValidationRun,
    ValidationRunner,
};
use chalops_core::validation::{
    callback_result_id, results_status, validate_flag, ValidationResult,
};
use chalops_db::{ChallengeStore, StoreError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::locks::KeyedLocks;

/// Reload-and-retry attempts for a compare-and-swap update.
pub const MAX_UPDATE_ATTEMPTS: usize = 5;

// ---------------------------------------------------------------------------
// Inputs and outcomes
// ---------------------------------------------------------------------------

/// A deploy request after the caller's identity was resolved. The ids are
/// chosen up front so they can be returned before the work runs.
#[derive(Debug, Clone)]
pub struct DeployIntent {
    pub spec: ChallengeSpec,
    pub user_id: String,
    pub deployment_id: String,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DestroyOutcome {
    Destroyed(Deployment),
    /// The deployment was already destroyed; nothing was called.
    AlreadyDestroyed(Deployment),
}

impl DestroyOutcome {
    pub fn deployment(&self) -> &Deployment {
        match self {
            Self::Destroyed(d) | Self::AlreadyDestroyed(d) => d,
        }
    }
}

/// What one validation attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub job_id: String,
    /// Results recorded inline; empty when validation was dispatched.
    pub results: Vec<ValidationResult>,
    pub job_handle: Option<JobHandle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResults {
    pub deployment_id: String,
    pub results: Vec<ValidationResult>,
    /// `pending` until a result exists, `finished` afterwards.
    pub status: DeploymentStatus,
}

// ---------------------------------------------------------------------------
// Compare-and-swap helper
// ---------------------------------------------------------------------------

/// Apply `change` to `current` and write it back with a version check.
///
/// `change` returns `Ok(false)` when there is nothing to write. On a
/// version conflict the record is reloaded and `change` re-evaluated
/// against the fresh copy. Returns the stored record and whether a write
/// happened.
pub(crate) async fn modify_deployment<F>(
    store: &dyn ChallengeStore,
    mut current: Deployment,
    mut change: F,
) -> CoreResult<(Deployment, bool)>
where
    F: FnMut(&mut Deployment) -> CoreResult<bool> + Send,
{
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let mut next = current.clone();
        if !change(&mut next)? {
            return Ok((current, false));
        }
        match store.update_deployment(&next).await {
            Ok(stored) => return Ok((stored, true)),
            Err(e) if e.is_version_conflict() => {
                tracing::debug!(
                    deployment_id = %current.id,
                    attempt,
                    "Deployment changed concurrently, reloading",
                );
                current = store.get_deployment(&current.id).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(CoreError::Conflict(format!(
        "Deployment {} kept changing; gave up after {MAX_UPDATE_ATTEMPTS} attempts",
        current.id
    )))
}

fn require_user(user_id: &str) -> CoreResult<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(CoreError::Unauthorized("caller identity is required".into()));
    }
    Ok(user_id)
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct DeploymentOrchestrator {
    store: Arc<dyn ChallengeStore>,
    deployer: Arc<dyn ChallengeDeployer>,
    validator: Arc<dyn ValidationRunner>,
    manifest_root: String,
    locks: KeyedLocks,
}

impl DeploymentOrchestrator {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        deployer: Arc<dyn ChallengeDeployer>,
        validator: Arc<dyn ValidationRunner>,
        manifest_root: impl Into<String>,
    ) -> Self {
        Self {
            store,
            deployer,
            validator,
            manifest_root: manifest_root.into(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChallengeStore> {
        &self.store
    }

    /// Provision a challenge for a user.
    ///
    /// The challenge definition is persisted as `initializing` before the
    /// deployer is called. On success a deployment is persisted with the
    /// deployer's initial status and the challenge becomes `active`. On
    /// failure or cancellation the challenge becomes `failed` and no
    /// deployment is persisted.
    pub async fn deploy(
        &self,
        cancel: &CancellationToken,
        intent: DeployIntent,
    ) -> CoreResult<Deployment> {
        let user_id = require_user(&intent.user_id)?;
        validate_challenge_id(&intent.spec.id)?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let existing = match self.store.get_challenge(&intent.spec.id).await {
            Ok(challenge) => Some(challenge),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let mut challenge = intent.spec.resolve(existing, &self.manifest_root);
        self.store.save_challenge(&challenge).await?;

        let request = DeployRequest {
            deployment_id: &intent.deployment_id,
            job_id: &intent.job_id,
            user_id,
            challenge: &challenge,
        };
        let provisioned = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            result = self.deployer.deploy(request) => result.map_err(CoreError::from),
        };

        let provisioned = match provisioned {
            Ok(provisioned) => provisioned,
            Err(err) => {
                tracing::error!(
                    challenge_id = %challenge.id,
                    deployment_id = %intent.deployment_id,
                    error = %err,
                    "Provisioning failed",
                );
                self.mark_challenge(&mut challenge, ChallengeStatus::Failed).await;
                return Err(err);
            }
        };

        let mut deployment = Deployment::new(
            intent.deployment_id.as_str(),
            challenge.id.as_str(),
            user_id,
            provisioned.status,
        );
        deployment.merge_instances(provisioned.instance_ids);
        if let Some(handle) = provisioned.job_handle {
            deployment.record_job(handle.into_inner());
        }
        self.store.save_deployment(&deployment).await?;

        challenge.set_status(ChallengeStatus::Active);
        self.store.save_challenge(&challenge).await?;

        tracing::info!(
            deployment_id = %deployment.id,
            challenge_id = %deployment.challenge_id,
            status = %deployment.status,
            "Deployment created",
        );
        Ok(deployment)
    }

    /// Tear a deployment down.
    ///
    /// Destroying an already destroyed deployment succeeds without calling
    /// the deployer. A `pending` deployment cannot be destroyed. When the
    /// deployer fails the deployment keeps its status.
    pub async fn destroy(
        &self,
        cancel: &CancellationToken,
        deployment_id: &str,
        user_id: &str,
        job_id: &str,
    ) -> CoreResult<DestroyOutcome> {
        let _guard = self.locks.lock(deployment_id).await;
        let deployment = self.deployment(deployment_id, user_id).await?;

        match deployment.status {
            DeploymentStatus::Destroyed => {
                tracing::debug!(%deployment_id, "Deployment already destroyed");
                return Ok(DestroyOutcome::AlreadyDestroyed(deployment));
            }
            DeploymentStatus::Pending => {
                return Err(CoreError::Conflict(format!(
                    "Deployment {deployment_id} is still pending and cannot be destroyed yet"
                )));
            }
            _ => {}
        }

        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            result = self.deployer.destroy(&deployment, job_id) => result.map_err(CoreError::from),
        };
        let handle = handle.inspect_err(|err| {
            tracing::error!(%deployment_id, error = %err, "Destroy failed, status unchanged");
        })?;

        let (stored, _) = modify_deployment(self.store.as_ref(), deployment, |d| {
            if d.status == DeploymentStatus::Destroyed {
                return Ok(false);
            }
            if let Some(handle) = &handle {
                d.record_job(handle.as_str());
            }
            d.transition_to(DeploymentStatus::Destroyed)?;
            Ok(true)
        })
        .await?;

        tracing::info!(%deployment_id, "Deployment destroyed");
        Ok(DestroyOutcome::Destroyed(stored))
    }

    /// Check a submitted flag against a deployment owned by `user_id`.
    pub async fn validate(
        &self,
        cancel: &CancellationToken,
        deployment_id: &str,
        user_id: &str,
        flag: &str,
        job_id: &str,
    ) -> CoreResult<ValidationOutcome> {
        validate_flag(flag)?;
        let deployment = self.deployment(deployment_id, user_id).await?;
        self.run_validation(cancel, deployment, Some(flag), job_id).await
    }

    /// Validation triggered by the system rather than a caller; no flag.
    pub async fn validate_system(
        &self,
        cancel: &CancellationToken,
        deployment: Deployment,
        job_id: &str,
    ) -> CoreResult<ValidationOutcome> {
        self.run_validation(cancel, deployment, None, job_id).await
    }

    async fn run_validation(
        &self,
        cancel: &CancellationToken,
        deployment: Deployment,
        flag: Option<&str>,
        job_id: &str,
    ) -> CoreResult<ValidationOutcome> {
        if deployment.status == DeploymentStatus::Destroyed {
            return Err(CoreError::Conflict(format!(
                "Deployment {} is destroyed",
                deployment.id
            )));
        }
        let challenge: Challenge = self.store.get_challenge(&deployment.challenge_id).await?;

        let request = ValidationRequest {
            deployment: &deployment,
            manifest: &challenge.manifest,
            flag,
            job_id,
        };
        let run = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            result = self.validator.run(request) => result.map_err(CoreError::from),
        };
        let run = run.inspect_err(|err| {
            tracing::error!(deployment_id = %deployment.id, error = %err, "Validation failed to run");
        })?;

        match run {
            ValidationRun::Completed(drafts) => {
                let mut results = Vec::with_capacity(drafts.len());
                for (index, draft) in drafts.into_iter().enumerate() {
                    let id = callback_result_id(job_id, draft.step, index);
                    let result = draft.into_result(id, deployment.id.as_str(), job_id);
                    self.store.save_validation_result(&result).await?;
                    results.push(result);
                }
                tracing::info!(
                    deployment_id = %deployment.id,
                    %job_id,
                    passed = results.iter().filter(|r| r.ok).count(),
                    total = results.len(),
                    "Validation recorded",
                );
                Ok(ValidationOutcome {
                    job_id: job_id.to_string(),
                    results,
                    job_handle: None,
                })
            }
            ValidationRun::Dispatched(handle) => {
                let key = handle.as_str().to_string();
                modify_deployment(self.store.as_ref(), deployment, |d| Ok(d.record_job(key.as_str())))
                    .await?;
                tracing::info!(%job_id, job_handle = %handle, "Validation dispatched");
                Ok(ValidationOutcome {
                    job_id: job_id.to_string(),
                    results: Vec::new(),
                    job_handle: Some(handle),
                })
            }
        }
    }

    /// Current status of a deployment owned by `user_id`, refreshed from
    /// the deployer.
    pub async fn get_status(&self, deployment_id: &str, user_id: &str) -> CoreResult<Deployment> {
        let deployment = self.deployment(deployment_id, user_id).await?;
        self.refresh_status(deployment).await
    }

    /// Ask the deployer for the live status and write it back when it is a
    /// legal move from the stored one.
    ///
    /// A failing status query leaves the record untouched and returns it.
    pub async fn refresh_status(&self, deployment: Deployment) -> CoreResult<Deployment> {
        if deployment.status.is_terminal() {
            return Ok(deployment);
        }
        let live = match self.deployer.status(&deployment).await {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(
                    deployment_id = %deployment.id,
                    error = %e,
                    "Live status query failed, returning stored status",
                );
                return Ok(deployment);
            }
        };
        if live == deployment.status {
            return Ok(deployment);
        }

        let (stored, changed) = modify_deployment(self.store.as_ref(), deployment, |d| {
            match d.status.path_to(live) {
                Some(path) if !path.is_empty() => d.advance_to(live),
                _ => Ok(false),
            }
        })
        .await?;

        if changed {
            tracing::info!(
                deployment_id = %stored.id,
                status = %stored.status,
                "Deployment status refreshed",
            );
        } else {
            tracing::debug!(
                deployment_id = %stored.id,
                stored = %stored.status,
                %live,
                "Live status is not reachable from stored status, keeping stored",
            );
        }
        Ok(stored)
    }

    /// Results of a deployment owned by `user_id`, in append order.
    pub async fn results(&self, deployment_id: &str, user_id: &str) -> CoreResult<DeploymentResults> {
        let deployment = self.deployment(deployment_id, user_id).await?;
        let results = self.store.get_validation_results(&deployment.id).await?;
        Ok(DeploymentResults {
            status: results_status(&results),
            deployment_id: deployment.id,
            results,
        })
    }

    /// Fetch a deployment owned by `user_id`. Another user's deployment is
    /// reported as not found.
    pub async fn deployment(&self, deployment_id: &str, user_id: &str) -> CoreResult<Deployment> {
        let user_id = require_user(user_id)?;
        let deployment = self.store.get_deployment(deployment_id).await?;
        if deployment.user_id != user_id {
            return Err(CoreError::not_found("Deployment", deployment_id));
        }
        Ok(deployment)
    }

    /// Deployments whose outcome is still owed by the executor.
    pub async fn transient_deployments(&self) -> CoreResult<Vec<Deployment>> {
        Ok(self
            .store
            .list_deployments_by_status(&[DeploymentStatus::Pending, DeploymentStatus::Running])
            .await?)
    }

    async fn mark_challenge(&self, challenge: &mut Challenge, status: ChallengeStatus) {
        challenge.set_status(status);
        if let Err(e) = self.store.save_challenge(challenge).await {
            tracing::error!(
                challenge_id = %challenge.id,
                %status,
                error = %e,
                "Failed to record challenge status",
            );
        }
    }
}
