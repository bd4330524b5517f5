//! Write-and-settle pipeline for ledger transactions.
//!
//! The pipeline turns a client-submitted request into a durably
//! recorded, exactly-once ledger entry and later drives it to a
//! terminal status:
//!
//! - [`WriteCoordinator`] runs the creation unit of work (idempotency
//!   guard, reference validation, aggregate construction, outbox and
//!   audit writes) atomically, retried as a whole on transient faults.
//! - [`OutboxRelay`] drains not-yet-published outbox entries to an
//!   [`EventPublisher`], marking each entry published strictly after a
//!   confirmed hand-off (at-least-once delivery).
//! - [`TransactionProcessor`] consumes a created notification,
//!   re-validates domain rules, and moves the transaction to
//!   `Executed` or `Failed`; duplicate delivery is a safe no-op.

mod coordinator;
mod error;
mod processor;
mod publisher;
mod relay;
mod request;
mod retry;

pub use coordinator::WriteCoordinator;
pub use error::PipelineError;
pub use processor::{ProcessOutcome, TransactionProcessor};
pub use publisher::{
    EventPublisher, InMemoryPublisher, PublishError, INDEXER_IMPORT_QUEUE,
    TRANSACTION_CREATED_QUEUE,
};
pub use relay::{OutboxRelay, RelayConfig};
pub use request::CreateTransactionRequest;
pub use retry::{retry_with_backoff, RetryPolicy};
