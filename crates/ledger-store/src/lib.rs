//! Storage boundary for the ledger write-and-settle pipeline.
//!
//! Defines the [`LedgerStore`] and [`ReferenceDirectory`] traits plus two
//! implementations with identical semantics: a PostgreSQL store for
//! production and an in-memory store for tests and the demo binary.
//!
//! The store owns the pipeline's two atomic units of work:
//! [`LedgerStore::commit_creation`] (transaction + idempotency record +
//! outbox entry + audit entry, all or nothing) and
//! [`LedgerStore::commit_transition`] (terminal status change + audit
//! entry, conditional on the row still being `Pending`).

mod error;
mod memory;
mod postgres;
mod records;
mod store;

pub use error::{LedgerStoreError, Result};
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use records::{
    AuditEntry, AuditEntryBuilder, CreationUnit, IdempotencyRecord, OutboxEntry, OutboxStatus,
    UnknownOutboxStatus,
};
pub use store::{LedgerStore, ReferenceDirectory};
