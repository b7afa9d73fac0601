//! Repository for the `completion_events` queue table.
//!
//! Consumers claim with `FOR UPDATE SKIP LOCKED`, so several workers can
//! drain the queue without handing the same event to two of them.

use sqlx::PgPool;

use crate::models::completion::CompletionRow;

const COLUMNS: &str = "\
    id, deployment_id, status, attempts, last_error, enqueued_at, claimed_at, completed_at";

/// A claim older than this is considered abandoned and may be re-claimed.
const CLAIM_LEASE_SECS: i64 = 300;

pub struct CompletionRepo;

impl CompletionRepo {
    pub async fn enqueue(
        pool: &PgPool,
        deployment_id: &str,
        status: &str,
    ) -> Result<CompletionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO completion_events (deployment_id, status) VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CompletionRow>(&query)
            .bind(deployment_id)
            .bind(status)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest unclaimed event.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<CompletionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE completion_events \
             SET claimed_at = NOW(), attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM completion_events \
                 WHERE completed_at IS NULL \
                   AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $1)) \
                 ORDER BY enqueued_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CompletionRow>(&query)
            .bind(CLAIM_LEASE_SECS as f64)
            .fetch_optional(pool)
            .await
    }

    pub async fn complete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE completion_events SET completed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt. The event is released for another attempt
    /// unless `give_up` is set, in which case it is closed with the error.
    pub async fn fail(
        pool: &PgPool,
        id: i64,
        error: &str,
        give_up: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE completion_events \
             SET last_error = $2, \
                 claimed_at = CASE WHEN $3 THEN claimed_at ELSE NULL END, \
                 completed_at = CASE WHEN $3 THEN NOW() ELSE NULL END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(give_up)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Events not yet completed.
    pub async fn pending_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM completion_events WHERE completed_at IS NULL")
            .fetch_one(pool)
            .await
    }
}
