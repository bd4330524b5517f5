use async_trait::async_trait;
use common::{FundId, IdempotencyKey, OutboxEntryId, SecurityId, TransactionId, TransactionSubTypeId};
use domain::LedgerTransaction;

use crate::records::{AuditEntry, CreationUnit, IdempotencyRecord, OutboxEntry};
use crate::Result;

/// Core trait for ledger store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and must make
/// `commit_creation` and `commit_transition` atomic: on any failure
/// inside the unit of work, none of its writes survive.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Looks up an idempotency record by key.
    ///
    /// Returns None when the key has never been recorded. A record whose
    /// `transaction_id` is None is a partially-written leftover and is
    /// treated by callers as "not yet created".
    async fn find_idempotency(&self, key: IdempotencyKey) -> Result<Option<IdempotencyRecord>>;

    /// Loads a transaction by id, or None if it does not exist.
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<LedgerTransaction>>;

    /// Commits one creation unit of work atomically: the transaction
    /// row, its idempotency record, the outbox entry, and the audit
    /// entry.
    ///
    /// Fails with `DuplicateIdempotencyKey` when a concurrent creator
    /// already recorded the same key; the caller replays the lookup.
    async fn commit_creation(&self, unit: CreationUnit) -> Result<()>;

    /// Commits a terminal status transition plus its audit entry
    /// atomically.
    ///
    /// The update is conditional on the stored row still being
    /// `Pending`; a concurrent processor that already moved the row to a
    /// terminal status surfaces as `TransitionConflict`.
    async fn commit_transition(
        &self,
        transaction: &LedgerTransaction,
        audit: AuditEntry,
    ) -> Result<()>;

    /// Fetches up to `limit` not-yet-published outbox entries in
    /// creation order.
    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Marks an outbox entry as published, strictly after a confirmed
    /// hand-off to the transport.
    async fn mark_published(&self, id: OutboxEntryId) -> Result<()>;

    /// Records a failed publish attempt; the entry stays eligible for
    /// retry.
    async fn record_publish_failure(&self, id: OutboxEntryId, error: &str) -> Result<()>;

    /// Returns the audit trail for an entity in recording order.
    async fn audit_entries_for(&self, entity_name: &str, entity_id: &str)
        -> Result<Vec<AuditEntry>>;
}

/// Existence checks against the master-data reference tables.
///
/// The write coordinator validates foreign references through this
/// boundary before constructing an aggregate; maintenance of the
/// reference data itself lives outside the pipeline.
#[async_trait]
pub trait ReferenceDirectory: Send + Sync {
    /// Returns true if the fund exists.
    async fn fund_exists(&self, id: FundId) -> Result<bool>;

    /// Returns true if the security exists.
    async fn security_exists(&self, id: SecurityId) -> Result<bool>;

    /// Returns true if the transaction sub-type exists.
    async fn sub_type_exists(&self, id: TransactionSubTypeId) -> Result<bool>;
}
