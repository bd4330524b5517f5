//! Shared identifier types used across the ledger pipeline crates.

mod types;

pub use types::{
    FundId, IdempotencyKey, OutboxEntryId, SecurityId, TransactionId, TransactionSubTypeId,
};
