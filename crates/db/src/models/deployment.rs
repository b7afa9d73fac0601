use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::types::Timestamp;
use sqlx::FromRow;

use crate::error::StoreError;

/// A row from the `deployments` table.
#[derive(Debug, Clone, FromRow)]
pub struct DeploymentRow {
    pub id: String,
    pub challenge_id: String,
    pub user_id: String,
    pub instance_ids: Vec<String>,
    pub job_handles: Vec<String>,
    pub status: String,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = StoreError;

    /// Rejects rows whose status is not a recognized literal.
    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        let status: DeploymentStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::InvalidRecord(format!("deployment {}: {e}", row.id)))?;
        Ok(Deployment {
            id: row.id,
            challenge_id: row.challenge_id,
            user_id: row.user_id,
            instance_ids: row.instance_ids,
            job_handles: row.job_handles,
            status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
