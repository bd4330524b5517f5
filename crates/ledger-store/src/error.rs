use common::{IdempotencyKey, OutboxEntryId, TransactionId};
use domain::UnknownStatus;
use thiserror::Error;

use crate::records::UnknownOutboxStatus;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// The idempotency key is already recorded (unique constraint hit).
    /// A concurrent creator with the same key won the race; the caller
    /// should re-read the key and replay the winner's transaction.
    #[error("Idempotency key {0} already recorded")]
    DuplicateIdempotencyKey(IdempotencyKey),

    /// The transaction row does not exist.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// A terminal transition was attempted on a row that is no longer
    /// `Pending` (a concurrent processor got there first).
    #[error("Transition conflict for transaction {id}: status is {status}, expected Pending")]
    TransitionConflict { id: TransactionId, status: String },

    /// The outbox entry does not exist.
    #[error("Outbox entry not found: {0}")]
    OutboxEntryNotFound(OutboxEntryId),

    /// The outbox entry was already marked published.
    #[error("Outbox entry {0} is already published")]
    AlreadyPublished(OutboxEntryId),

    /// The storage backend is temporarily unavailable.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored transaction status string failed to parse.
    #[error("Invalid stored status: {0}")]
    InvalidStatus(#[from] UnknownStatus),

    /// A stored outbox status string failed to parse.
    #[error("Invalid stored outbox status: {0}")]
    InvalidOutboxStatus(#[from] UnknownOutboxStatus),
}

impl LedgerStoreError {
    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerStoreError::Unavailable(_) => true,
            LedgerStoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Result type for ledger store operations.
pub type Result<T> = std::result::Result<T, LedgerStoreError>;
