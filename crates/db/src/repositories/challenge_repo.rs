//! Repository for the `challenges` table.

use chalops_core::challenge::Challenge;
use sqlx::PgPool;

use crate::models::challenge::ChallengeRow;

/// Column list for `challenges` queries.
const COLUMNS: &str = "id, name, description, manifest, status, created_at, updated_at";

pub struct ChallengeRepo;

impl ChallengeRepo {
    /// Insert a challenge, replacing every mutable column if it exists.
    pub async fn upsert(pool: &PgPool, challenge: &Challenge) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO challenges (id, name, description, manifest, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 manifest = EXCLUDED.manifest, \
                 status = EXCLUDED.status, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&challenge.id)
        .bind(&challenge.name)
        .bind(&challenge.description)
        .bind(&challenge.manifest)
        .bind(challenge.status.as_str())
        .bind(challenge.created_at)
        .bind(challenge.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ChallengeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM challenges WHERE id = $1");
        sqlx::query_as::<_, ChallengeRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
