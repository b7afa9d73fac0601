//! Completion-event queue.
//!
//! Executors that report through a message bus publish a
//! [`CompletionEvent`] per finished deployment. Consumers claim events one
//! at a time, then `ack` them once handled or `nack` them to retry. An event
//! that fails [`MAX_ATTEMPTS`] times is closed and kept for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chalops_core::types::Timestamp;
use chalops_db::models::completion::CompletionRow;
use chalops_db::repositories::CompletionRepo;
use chalops_db::DbPool;
use serde::{Deserialize, Serialize};

/// Attempts after which a failing event is given up on.
pub const MAX_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// "Deployment finished" notification keyed by deployment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub deployment_id: String,
    /// Status word reported by the executor (`success`, `failure`, ...).
    pub status: String,
}

impl CompletionEvent {
    pub fn new(deployment_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            status: status.into(),
        }
    }
}

/// An event handed to one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedEvent {
    /// Queue-assigned identifier used to `ack`/`nack`.
    pub receipt: i64,
    pub event: CompletionEvent,
    /// Attempts including this one.
    pub attempts: u32,
    pub enqueued_at: Timestamp,
}

impl From<CompletionRow> for ClaimedEvent {
    fn from(row: CompletionRow) -> Self {
        Self {
            receipt: row.id,
            event: CompletionEvent::new(row.deployment_id, row.status),
            attempts: row.attempts.max(0) as u32,
            enqueued_at: row.enqueued_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("Unknown receipt {0}")]
    UnknownReceipt(i64),

    #[error("Queue lock poisoned")]
    LockPoisoned,
}

#[async_trait]
pub trait CompletionQueue: Send + Sync {
    async fn publish(&self, event: CompletionEvent) -> Result<i64, QueueError>;

    /// Claim the oldest available event, if any.
    async fn claim(&self) -> Result<Option<ClaimedEvent>, QueueError>;

    async fn ack(&self, claimed: &ClaimedEvent) -> Result<(), QueueError>;

    /// Release a failed event for retry, or close it once
    /// [`MAX_ATTEMPTS`] is reached. Returns `true` if it will be retried.
    async fn nack(&self, claimed: &ClaimedEvent, error: &str) -> Result<bool, QueueError>;
}

// ---------------------------------------------------------------------------
// In-memory queue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    next_receipt: i64,
    ready: VecDeque<ClaimedEvent>,
    in_flight: HashMap<i64, ClaimedEvent>,
    dead: Vec<(ClaimedEvent, String)>,
}

/// Process-local queue for tests and single-binary deployments.
#[derive(Debug, Default)]
pub struct MemoryCompletionQueue {
    state: Mutex<MemoryState>,
}

impl MemoryCompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events waiting to be claimed.
    pub fn ready_len(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Events given up on, with their last error.
    pub fn dead_letters(&self) -> Vec<(CompletionEvent, String)> {
        self.state
            .lock()
            .map(|s| {
                s.dead
                    .iter()
                    .map(|(c, e)| (c.event.clone(), e.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionQueue for MemoryCompletionQueue {
    async fn publish(&self, event: CompletionEvent) -> Result<i64, QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::LockPoisoned)?;
        state.next_receipt += 1;
        let receipt = state.next_receipt;
        state.ready.push_back(ClaimedEvent {
            receipt,
            event,
            attempts: 0,
            enqueued_at: chrono::Utc::now(),
        });
        Ok(receipt)
    }

    async fn claim(&self) -> Result<Option<ClaimedEvent>, QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::LockPoisoned)?;
        let Some(mut claimed) = state.ready.pop_front() else {
            return Ok(None);
        };
        claimed.attempts += 1;
        state.in_flight.insert(claimed.receipt, claimed.clone());
        Ok(Some(claimed))
    }

    async fn ack(&self, claimed: &ClaimedEvent) -> Result<(), QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::LockPoisoned)?;
        state
            .in_flight
            .remove(&claimed.receipt)
            .map(|_| ())
            .ok_or(QueueError::UnknownReceipt(claimed.receipt))
    }

    async fn nack(&self, claimed: &ClaimedEvent, error: &str) -> Result<bool, QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::LockPoisoned)?;
        let entry = state
            .in_flight
            .remove(&claimed.receipt)
            .ok_or(QueueError::UnknownReceipt(claimed.receipt))?;
        if entry.attempts >= MAX_ATTEMPTS {
            state.dead.push((entry, error.to_string()));
            Ok(false)
        } else {
            state.ready.push_back(entry);
            Ok(true)
        }
    }
}

// ---------------------------------------------------------------------------
// Postgres queue
// ---------------------------------------------------------------------------

/// Queue stored in the `completion_events` table; safe for many consumers.
#[derive(Debug, Clone)]
pub struct PgCompletionQueue {
    pool: DbPool,
}

impl PgCompletionQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompletionQueue for PgCompletionQueue {
    async fn publish(&self, event: CompletionEvent) -> Result<i64, QueueError> {
        let row = CompletionRepo::enqueue(&self.pool, &event.deployment_id, &event.status).await?;
        Ok(row.id)
    }

    async fn claim(&self) -> Result<Option<ClaimedEvent>, QueueError> {
        Ok(CompletionRepo::claim_next(&self.pool)
            .await?
            .map(ClaimedEvent::from))
    }

    async fn ack(&self, claimed: &ClaimedEvent) -> Result<(), QueueError> {
        CompletionRepo::complete(&self.pool, claimed.receipt).await?;
        Ok(())
    }

    async fn nack(&self, claimed: &ClaimedEvent, error: &str) -> Result<bool, QueueError> {
        let give_up = claimed.attempts >= MAX_ATTEMPTS;
        CompletionRepo::fail(&self.pool, claimed.receipt, error, give_up).await?;
        Ok(!give_up)
    }
}
