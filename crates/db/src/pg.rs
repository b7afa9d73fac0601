//! [`ChallengeStore`] backed by PostgreSQL.

use async_trait::async_trait;
use chalops_core::challenge::Challenge;
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::validation::ValidationResult;

use crate::error::{classify_insert, StoreError, StoreResult};
use crate::repositories::{ChallengeRepo, DeploymentRepo, ValidationResultRepo};
use crate::store::ChallengeStore;
use crate::DbPool;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ChallengeStore for PgStore {
    async fn save_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        ChallengeRepo::upsert(&self.pool, challenge).await?;
        Ok(())
    }

    async fn get_challenge(&self, id: &str) -> StoreResult<Challenge> {
        ChallengeRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Challenge", id))?
            .try_into()
    }

    async fn save_deployment(&self, deployment: &Deployment) -> StoreResult<()> {
        DeploymentRepo::insert(&self.pool, deployment)
            .await
            .map_err(|e| classify_insert(e, || format!("deployment {}", deployment.id)))
    }

    async fn get_deployment(&self, id: &str) -> StoreResult<Deployment> {
        DeploymentRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Deployment", id))?
            .try_into()
    }

    async fn update_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment> {
        match DeploymentRepo::update_if_version(&self.pool, deployment).await? {
            Some(row) => row.try_into(),
            None => {
                // No row matched: either it does not exist or the version moved.
                if DeploymentRepo::find_by_id(&self.pool, &deployment.id)
                    .await?
                    .is_none()
                {
                    return Err(StoreError::not_found("Deployment", &deployment.id));
                }
                Err(StoreError::VersionConflict {
                    id: deployment.id.clone(),
                    expected: deployment.version,
                })
            }
        }
    }

    async fn find_deployment_by_job(&self, job_handle: &str) -> StoreResult<Option<Deployment>> {
        DeploymentRepo::find_by_job_handle(&self.pool, job_handle)
            .await?
            .map(Deployment::try_from)
            .transpose()
    }

    async fn list_deployments_by_status(
        &self,
        statuses: &[DeploymentStatus],
    ) -> StoreResult<Vec<Deployment>> {
        let literals: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        DeploymentRepo::list_by_statuses(&self.pool, &literals)
            .await?
            .into_iter()
            .map(Deployment::try_from)
            .collect()
    }

    async fn save_validation_result(&self, result: &ValidationResult) -> StoreResult<bool> {
        ValidationResultRepo::insert_if_absent(&self.pool, result)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    StoreError::not_found("Deployment", &result.deployment_id)
                }
                _ => StoreError::Database(e),
            })
    }

    async fn get_validation_results(
        &self,
        deployment_id: &str,
    ) -> StoreResult<Vec<ValidationResult>> {
        let rows = ValidationResultRepo::list_by_deployment(&self.pool, deployment_id).await?;
        Ok(rows.into_iter().map(ValidationResult::from).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
