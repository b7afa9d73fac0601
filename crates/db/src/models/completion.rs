use chalops_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `completion_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompletionRow {
    pub id: i64,
    pub deployment_id: String,
    /// Status literal reported by the executor.
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub enqueued_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}
