//! Repository for the `deployments` table.

use chalops_core::deployment::Deployment;
use sqlx::PgPool;

use crate::models::deployment::DeploymentRow;

/// Column list for `deployments` queries.
const COLUMNS: &str = "\
    id, challenge_id, user_id, instance_ids, job_handles, status, version, \
    created_at, updated_at";

pub struct DeploymentRepo;

impl DeploymentRepo {
    pub async fn insert(pool: &PgPool, deployment: &Deployment) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO deployments \
                 (id, challenge_id, user_id, instance_ids, job_handles, status, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&deployment.id)
        .bind(&deployment.challenge_id)
        .bind(&deployment.user_id)
        .bind(&deployment.instance_ids)
        .bind(&deployment.job_handles)
        .bind(deployment.status.as_str())
        .bind(deployment.version)
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<DeploymentRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM deployments WHERE id = $1");
        sqlx::query_as::<_, DeploymentRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Replace the row only if its version still equals `deployment.version`,
    /// bumping the version. Returns `None` when no row matched.
    pub async fn update_if_version(
        pool: &PgPool,
        deployment: &Deployment,
    ) -> Result<Option<DeploymentRow>, sqlx::Error> {
        let query = format!(
            "UPDATE deployments \
             SET instance_ids = $3, job_handles = $4, status = $5, updated_at = $6, \
                 version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeploymentRow>(&query)
            .bind(&deployment.id)
            .bind(deployment.version)
            .bind(&deployment.instance_ids)
            .bind(&deployment.job_handles)
            .bind(deployment.status.as_str())
            .bind(deployment.updated_at)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_job_handle(
        pool: &PgPool,
        job_handle: &str,
    ) -> Result<Option<DeploymentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM deployments WHERE job_handles @> ARRAY[$1]::TEXT[] \
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, DeploymentRow>(&query)
            .bind(job_handle)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_statuses(
        pool: &PgPool,
        statuses: &[String],
    ) -> Result<Vec<DeploymentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM deployments WHERE status = ANY($1) ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, DeploymentRow>(&query)
            .bind(statuses)
            .fetch_all(pool)
            .await
    }
}
