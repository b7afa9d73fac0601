//! Persistence port for challenges, deployments, and validation results.
//!
//! The orchestrator is the only writer of deployment status. Updates go
//! through [`ChallengeStore::update_deployment`], a compare-and-swap on the
//! record's `version`, so a status write based on a stale read is rejected
//! with `StoreError::VersionConflict` instead of silently winning.

use async_trait::async_trait;
use chalops_core::challenge::Challenge;
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::validation::ValidationResult;

use crate::error::StoreResult;

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    // --- Challenges ---

    /// Insert or replace a challenge definition.
    async fn save_challenge(&self, challenge: &Challenge) -> StoreResult<()>;

    /// Fetch a challenge, or `StoreError::NotFound`.
    async fn get_challenge(&self, id: &str) -> StoreResult<Challenge>;

    // --- Deployments ---

    /// Insert a new deployment. Fails with `StoreError::Duplicate` if the
    /// id is taken.
    async fn save_deployment(&self, deployment: &Deployment) -> StoreResult<()>;

    /// Fetch a deployment, or `StoreError::NotFound`.
    async fn get_deployment(&self, id: &str) -> StoreResult<Deployment>;

    /// Replace a deployment if its stored version equals `deployment.version`.
    ///
    /// Returns the stored record, whose version is one higher than the
    /// input's.
    async fn update_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment>;

    /// Deployment that recorded `job_handle` among its dispatched jobs.
    async fn find_deployment_by_job(&self, job_handle: &str) -> StoreResult<Option<Deployment>>;

    /// Deployments currently in any of `statuses`, oldest first.
    async fn list_deployments_by_status(
        &self,
        statuses: &[DeploymentStatus],
    ) -> StoreResult<Vec<Deployment>>;

    // --- Validation results ---

    /// Append a result. Returns `false` when a result with the same id
    /// already exists; the stored result is left unchanged.
    async fn save_validation_result(&self, result: &ValidationResult) -> StoreResult<bool>;

    /// All results of a deployment in append order.
    async fn get_validation_results(&self, deployment_id: &str)
        -> StoreResult<Vec<ValidationResult>>;

    // --- Health ---

    /// Verify the backing store is reachable.
    async fn ping(&self) -> StoreResult<()>;
}
