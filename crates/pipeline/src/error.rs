//! Pipeline error types.

use common::{FundId, IdempotencyKey, SecurityId, TransactionSubTypeId};
use domain::TransactionError;
use ledger_store::LedgerStoreError;
use thiserror::Error;

/// Errors that can occur during pipeline operations.
///
/// Expected business outcomes (a rejected validation during processing,
/// a duplicate delivery) are not errors; they surface as
/// [`crate::ProcessOutcome`] variants instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Referenced fund does not exist.
    #[error("Fund not found: {0}")]
    FundNotFound(FundId),

    /// Referenced security does not exist.
    #[error("Security not found: {0}")]
    SecurityNotFound(SecurityId),

    /// Referenced transaction sub-type does not exist.
    #[error("Transaction sub-type not found: {0}")]
    SubTypeNotFound(TransactionSubTypeId),

    /// Field-level validation rejected the creation request.
    #[error("Validation error: {0}")]
    Validation(#[from] TransactionError),

    /// An idempotency record exists but its linked transaction could not
    /// be loaded.
    #[error("Idempotency record for key {0} has no loadable transaction")]
    DanglingIdempotency(IdempotencyKey),

    /// An error occurred in the ledger store.
    #[error("Store error: {0}")]
    Store(#[from] LedgerStoreError),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Store(e) if e.is_transient())
    }
}
