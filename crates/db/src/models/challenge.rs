use chalops_core::challenge::{Challenge, ChallengeStatus};
use chalops_core::types::Timestamp;
use sqlx::FromRow;

use crate::error::StoreError;

/// A row from the `challenges` table.
#[derive(Debug, Clone, FromRow)]
pub struct ChallengeRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub manifest: String,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ChallengeRow> for Challenge {
    type Error = StoreError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        let status: ChallengeStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::InvalidRecord(format!("challenge {}: {e}", row.id)))?;
        Ok(Challenge {
            id: row.id,
            name: row.name,
            description: row.description,
            manifest: row.manifest,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
