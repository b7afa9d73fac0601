//! Repository for the append-only `validation_results` table.

use chalops_core::validation::ValidationResult;
use sqlx::PgPool;

use crate::models::validation_result::ValidationResultRow;

/// Column list for `validation_results` queries.
const COLUMNS: &str = "id, deployment_id, job_id, step, name, ok, message, output, created_at";

pub struct ValidationResultRepo;

impl ValidationResultRepo {
    /// Append a result. Returns `false` if the id already existed.
    pub async fn insert_if_absent(
        pool: &PgPool,
        result: &ValidationResult,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "INSERT INTO validation_results \
                 (id, deployment_id, job_id, step, name, ok, message, output, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&result.id)
        .bind(&result.deployment_id)
        .bind(&result.job_id)
        .bind(result.step)
        .bind(&result.name)
        .bind(result.ok)
        .bind(&result.message)
        .bind(&result.output)
        .bind(result.created_at)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() == 1)
    }

    /// All results of a deployment in append order.
    pub async fn list_by_deployment(
        pool: &PgPool,
        deployment_id: &str,
    ) -> Result<Vec<ValidationResultRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM validation_results WHERE deployment_id = $1 ORDER BY seq ASC"
        );
        sqlx::query_as::<_, ValidationResultRow>(&query)
            .bind(deployment_id)
            .fetch_all(pool)
            .await
    }
}
