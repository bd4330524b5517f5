//! Domain layer for the ledger write-and-settle pipeline.
//!
//! This crate provides:
//! - The ledger transaction aggregate with its validating constructor
//! - The transaction status state machine (Pending → Executed | Failed)
//! - The protobuf wire format for the transaction-created domain event

pub mod transaction;

pub use transaction::{
    LedgerTransaction, TransactionCreated, TransactionDraft, TransactionError, TransactionStatus,
    UnknownStatus, EVENT_CONTENT_TYPE, TRANSACTION_CREATED_EVENT,
};
