//! Completion-event plumbing for executors that report through a queue.
//!
//! - [`CompletionQueue`] -- publish/claim/ack/nack contract, with an
//!   in-memory implementation and a Postgres one built on
//!   `FOR UPDATE SKIP LOCKED`.
//! - [`CompletionConsumer`] -- poll loop handing each event to a
//!   [`CompletionHandler`].

pub mod consumer;
pub mod queue;

pub use consumer::{CompletionConsumer, CompletionHandler};
pub use queue::{
    ClaimedEvent, CompletionEvent, CompletionQueue, MemoryCompletionQueue, PgCompletionQueue,
    QueueError,
};
