use chalops_core::types::Timestamp;
use chalops_core::validation::ValidationResult;
use sqlx::FromRow;

/// A row from the `validation_results` table.
#[derive(Debug, Clone, FromRow)]
pub struct ValidationResultRow {
    pub id: String,
    pub deployment_id: String,
    pub job_id: String,
    pub step: i32,
    pub name: String,
    pub ok: bool,
    pub message: String,
    pub output: String,
    pub created_at: Timestamp,
}

impl From<ValidationResultRow> for ValidationResult {
    fn from(row: ValidationResultRow) -> Self {
        ValidationResult {
            id: row.id,
            deployment_id: row.deployment_id,
            job_id: row.job_id,
            step: row.step,
            name: row.name,
            ok: row.ok,
            message: row.message,
            output: row.output,
            created_at: row.created_at,
        }
    }
}
