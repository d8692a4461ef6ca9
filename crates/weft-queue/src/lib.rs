//! # weft-queue
//!
//! Durable offline queue for weft.
//!
//! Tasks that could not be dispatched to any node land here. Entries are
//! persisted to the local filesystem before they are acknowledged, survive
//! process restarts, and are replayed by a periodic sync loop under a
//! priority + bounded-retry policy. A task is never silently discarded:
//! exhausting its retries leaves an auditable drop record.

use thiserror::Error;

pub mod store;
pub mod sync;

// Re-export commonly used types
pub use store::{DroppedEntry, QueueEntry, QueueStatus, QueueStore, RetryOutcome};
pub use sync::{QueueSynchronizer, ReplayDispatcher, SyncReport};

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur during queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    /// The durable store could not be read or written; fatal for the
    /// single enqueue/dequeue operation it interrupted.
    #[error("Queue persistence error: {0}")]
    Persistence(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QueueError> for weft_core::Error {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(msg) => weft_core::Error::NotFound(msg),
            QueueError::Persistence(msg) => weft_core::Error::QueuePersistence(msg),
            QueueError::Serialization(e) => weft_core::Error::QueuePersistence(e.to_string()),
            QueueError::Io(e) => weft_core::Error::QueuePersistence(e.to_string()),
        }
    }
}
