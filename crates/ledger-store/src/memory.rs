use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    FundId, IdempotencyKey, OutboxEntryId, SecurityId, TransactionId, TransactionSubTypeId,
};
use domain::LedgerTransaction;
use tokio::sync::RwLock;

use crate::records::{AuditEntry, CreationUnit, IdempotencyRecord, OutboxEntry, OutboxStatus};
use crate::store::{LedgerStore, ReferenceDirectory};
use crate::{LedgerStoreError, Result};

/// In-memory ledger store implementation for tests and demos.
///
/// Provides the same interface and atomicity semantics as the PostgreSQL
/// implementation, plus fault-injection switches for exercising the
/// pipeline's failure paths.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    transactions: RwLock<HashMap<TransactionId, LedgerTransaction>>,
    idempotency: RwLock<HashMap<IdempotencyKey, IdempotencyRecord>>,
    outbox: RwLock<Vec<OutboxEntry>>,
    audit: RwLock<Vec<AuditEntry>>,
    funds: RwLock<HashSet<FundId>>,
    securities: RwLock<HashSet<SecurityId>>,
    sub_types: RwLock<HashSet<TransactionSubTypeId>>,
    fail_on_outbox_write: AtomicBool,
    transient_failures: AtomicU32,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fund id for reference validation.
    pub async fn register_fund(&self, id: FundId) {
        self.inner.funds.write().await.insert(id);
    }

    /// Registers a security id for reference validation.
    pub async fn register_security(&self, id: SecurityId) {
        self.inner.securities.write().await.insert(id);
    }

    /// Registers a transaction sub-type id for reference validation.
    pub async fn register_sub_type(&self, id: TransactionSubTypeId) {
        self.inner.sub_types.write().await.insert(id);
    }

    /// Returns the number of stored transactions.
    pub async fn transaction_count(&self) -> usize {
        self.inner.transactions.read().await.len()
    }

    /// Returns the number of idempotency records.
    pub async fn idempotency_count(&self) -> usize {
        self.inner.idempotency.read().await.len()
    }

    /// Returns the total number of outbox entries.
    pub async fn outbox_count(&self) -> usize {
        self.inner.outbox.read().await.len()
    }

    /// Returns the number of outbox entries marked published.
    pub async fn published_count(&self) -> usize {
        self.inner
            .outbox
            .read()
            .await
            .iter()
            .filter(|e| e.status == OutboxStatus::Published)
            .count()
    }

    /// Returns the total number of audit entries.
    pub async fn audit_count(&self) -> usize {
        self.inner.audit.read().await.len()
    }

    /// Makes the next creation units fail at the outbox write, leaving
    /// nothing persisted. Used to exercise the atomicity guarantee.
    pub fn set_fail_on_outbox_write(&self, fail: bool) {
        self.inner
            .fail_on_outbox_write
            .store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` units of work fail with a transient
    /// storage error before touching any state.
    pub fn inject_transient_failures(&self, count: u32) {
        self.inner
            .transient_failures
            .store(count, Ordering::SeqCst);
    }

    /// Inserts an idempotency record with no linked transaction, as left
    /// behind by a crashed earlier attempt on a non-atomic store.
    pub async fn insert_unlinked_idempotency(&self, key: IdempotencyKey) {
        let record = IdempotencyRecord {
            key,
            transaction_id: None,
            created_at: chrono::Utc::now(),
        };
        self.inner.idempotency.write().await.insert(key, record);
    }

    fn take_transient_failure(&self) -> bool {
        self.inner
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_idempotency(&self, key: IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        Ok(self.inner.idempotency.read().await.get(&key).cloned())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<LedgerTransaction>> {
        Ok(self.inner.transactions.read().await.get(&id).cloned())
    }

    async fn commit_creation(&self, unit: CreationUnit) -> Result<()> {
        if self.take_transient_failure() {
            return Err(LedgerStoreError::Unavailable(
                "injected transient failure".to_string(),
            ));
        }

        // The idempotency map write lock is held for the whole unit so
        // concurrent creators serialize on the key check.
        let mut idempotency = self.inner.idempotency.write().await;

        if let Some(existing) = idempotency.get(&unit.idempotency.key)
            && existing.transaction_id.is_some()
        {
            return Err(LedgerStoreError::DuplicateIdempotencyKey(
                unit.idempotency.key,
            ));
        }

        if self.inner.fail_on_outbox_write.load(Ordering::SeqCst) {
            return Err(LedgerStoreError::Unavailable(
                "outbox write failed".to_string(),
            ));
        }

        let mut transactions = self.inner.transactions.write().await;
        let mut outbox = self.inner.outbox.write().await;
        let mut audit = self.inner.audit.write().await;

        idempotency.insert(unit.idempotency.key, unit.idempotency);
        transactions.insert(unit.transaction.id(), unit.transaction);
        outbox.push(unit.outbox);
        audit.push(unit.audit);

        Ok(())
    }

    async fn commit_transition(
        &self,
        transaction: &LedgerTransaction,
        audit: AuditEntry,
    ) -> Result<()> {
        if self.take_transient_failure() {
            return Err(LedgerStoreError::Unavailable(
                "injected transient failure".to_string(),
            ));
        }

        let mut transactions = self.inner.transactions.write().await;

        match transactions.get(&transaction.id()) {
            None => {
                return Err(LedgerStoreError::TransactionNotFound(transaction.id()));
            }
            Some(stored) if !stored.status().can_process() => {
                return Err(LedgerStoreError::TransitionConflict {
                    id: transaction.id(),
                    status: stored.status().to_string(),
                });
            }
            Some(_) => {}
        }

        transactions.insert(transaction.id(), transaction.clone());
        self.inner.audit.write().await.push(audit);

        Ok(())
    }

    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let outbox = self.inner.outbox.read().await;
        Ok(outbox
            .iter()
            .filter(|e| e.status != OutboxStatus::Published)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: OutboxEntryId) -> Result<()> {
        let mut outbox = self.inner.outbox.write().await;
        let entry = outbox
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(LedgerStoreError::OutboxEntryNotFound(id))?;
        entry.mark_published()
    }

    async fn record_publish_failure(&self, id: OutboxEntryId, error: &str) -> Result<()> {
        let mut outbox = self.inner.outbox.write().await;
        let entry = outbox
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(LedgerStoreError::OutboxEntryNotFound(id))?;
        entry.record_failure(error);
        Ok(())
    }

    async fn audit_entries_for(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>> {
        let audit = self.inner.audit.read().await;
        Ok(audit
            .iter()
            .filter(|e| e.entity_name == entity_name && e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReferenceDirectory for InMemoryLedgerStore {
    async fn fund_exists(&self, id: FundId) -> Result<bool> {
        Ok(self.inner.funds.read().await.contains(&id))
    }

    async fn security_exists(&self, id: SecurityId) -> Result<bool> {
        Ok(self.inner.securities.read().await.contains(&id))
    }

    async fn sub_type_exists(&self, id: TransactionSubTypeId) -> Result<bool> {
        Ok(self.inner.sub_types.read().await.contains(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use domain::{TransactionDraft, TransactionStatus};
    use rust_decimal::Decimal;

    fn sample_transaction() -> LedgerTransaction {
        LedgerTransaction::create(
            TransactionId::new(),
            TransactionDraft {
                fund_id: FundId::new(1),
                security_id: None,
                sub_type_id: TransactionSubTypeId::new(2),
                trade_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                settle_date: NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
                quantity: Decimal::from(100),
                price: Decimal::from(5),
                amount: Decimal::from(500),
                currency: "USD".to_string(),
                created_by: "tester".to_string(),
            },
        )
        .unwrap()
    }

    fn sample_unit(key: IdempotencyKey) -> CreationUnit {
        let transaction = sample_transaction();
        let audit = AuditEntry::builder()
            .entity_name("Transaction")
            .entity_id(transaction.id().to_string())
            .event_type("Created")
            .build();
        CreationUnit {
            idempotency: IdempotencyRecord::new(key, transaction.id()),
            outbox: OutboxEntry::new("TransactionCreated", vec![1, 2, 3]),
            audit,
            transaction,
        }
    }

    #[tokio::test]
    async fn commit_creation_stores_all_records() {
        let store = InMemoryLedgerStore::new();
        let key = IdempotencyKey::new();
        let unit = sample_unit(key);
        let tx_id = unit.transaction.id();

        store.commit_creation(unit).await.unwrap();

        assert_eq!(store.transaction_count().await, 1);
        assert_eq!(store.idempotency_count().await, 1);
        assert_eq!(store.outbox_count().await, 1);
        assert_eq!(store.audit_count().await, 1);

        let record = store.find_idempotency(key).await.unwrap().unwrap();
        assert_eq!(record.transaction_id, Some(tx_id));

        let stored = store.get_transaction(tx_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn commit_creation_rejects_duplicate_key() {
        let store = InMemoryLedgerStore::new();
        let key = IdempotencyKey::new();

        store.commit_creation(sample_unit(key)).await.unwrap();
        let result = store.commit_creation(sample_unit(key)).await;

        assert!(matches!(
            result,
            Err(LedgerStoreError::DuplicateIdempotencyKey(k)) if k == key
        ));
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn commit_creation_links_unlinked_record() {
        let store = InMemoryLedgerStore::new();
        let key = IdempotencyKey::new();
        store.insert_unlinked_idempotency(key).await;

        let unit = sample_unit(key);
        let tx_id = unit.transaction.id();
        store.commit_creation(unit).await.unwrap();

        let record = store.find_idempotency(key).await.unwrap().unwrap();
        assert_eq!(record.transaction_id, Some(tx_id));
    }

    #[tokio::test]
    async fn failed_outbox_write_leaves_nothing_behind() {
        let store = InMemoryLedgerStore::new();
        store.set_fail_on_outbox_write(true);

        let result = store.commit_creation(sample_unit(IdempotencyKey::new())).await;

        assert!(matches!(result, Err(LedgerStoreError::Unavailable(_))));
        assert_eq!(store.transaction_count().await, 0);
        assert_eq!(store.idempotency_count().await, 0);
        assert_eq!(store.outbox_count().await, 0);
        assert_eq!(store.audit_count().await, 0);
    }

    #[tokio::test]
    async fn injected_transient_failures_are_consumed() {
        let store = InMemoryLedgerStore::new();
        store.inject_transient_failures(1);
        let key = IdempotencyKey::new();

        let err = store
            .commit_creation(sample_unit(key))
            .await
            .unwrap_err();
        assert!(matches!(&err, LedgerStoreError::Unavailable(_)));
        assert!(err.is_transient());

        store.commit_creation(sample_unit(key)).await.unwrap();
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn commit_transition_updates_pending_row() {
        let store = InMemoryLedgerStore::new();
        let unit = sample_unit(IdempotencyKey::new());
        let mut tx = unit.transaction.clone();
        store.commit_creation(unit).await.unwrap();

        tx.execute().unwrap();
        let audit = AuditEntry::builder()
            .entity_name("Transaction")
            .entity_id(tx.id().to_string())
            .event_type("StatusChanged")
            .build();
        store.commit_transition(&tx, audit).await.unwrap();

        let stored = store.get_transaction(tx.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), TransactionStatus::Executed);
        assert_eq!(store.audit_count().await, 2);
    }

    #[tokio::test]
    async fn commit_transition_conflicts_on_terminal_row() {
        let store = InMemoryLedgerStore::new();
        let unit = sample_unit(IdempotencyKey::new());
        let mut tx = unit.transaction.clone();
        store.commit_creation(unit).await.unwrap();

        tx.execute().unwrap();
        let audit = |tx: &LedgerTransaction| {
            AuditEntry::builder()
                .entity_name("Transaction")
                .entity_id(tx.id().to_string())
                .event_type("StatusChanged")
                .build()
        };
        store.commit_transition(&tx, audit(&tx)).await.unwrap();

        let result = store.commit_transition(&tx, audit(&tx)).await;
        assert!(matches!(
            result,
            Err(LedgerStoreError::TransitionConflict { .. })
        ));
    }

    #[tokio::test]
    async fn commit_transition_missing_row() {
        let store = InMemoryLedgerStore::new();
        let mut tx = sample_transaction();
        tx.execute().unwrap();

        let audit = AuditEntry::builder()
            .entity_name("Transaction")
            .entity_id(tx.id().to_string())
            .event_type("StatusChanged")
            .build();
        let result = store.commit_transition(&tx, audit).await;
        assert!(matches!(
            result,
            Err(LedgerStoreError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn fetch_unpublished_skips_published_entries() {
        let store = InMemoryLedgerStore::new();
        store.commit_creation(sample_unit(IdempotencyKey::new())).await.unwrap();
        store.commit_creation(sample_unit(IdempotencyKey::new())).await.unwrap();

        let entries = store.fetch_unpublished(10).await.unwrap();
        assert_eq!(entries.len(), 2);

        store.mark_published(entries[0].id).await.unwrap();

        let remaining = store.fetch_unpublished(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, entries[1].id);
        assert_eq!(store.published_count().await, 1);
    }

    #[tokio::test]
    async fn mark_published_twice_fails() {
        let store = InMemoryLedgerStore::new();
        store.commit_creation(sample_unit(IdempotencyKey::new())).await.unwrap();

        let entries = store.fetch_unpublished(10).await.unwrap();
        store.mark_published(entries[0].id).await.unwrap();
        let result = store.mark_published(entries[0].id).await;
        assert!(matches!(result, Err(LedgerStoreError::AlreadyPublished(_))));
    }

    #[tokio::test]
    async fn record_publish_failure_keeps_entry_eligible() {
        let store = InMemoryLedgerStore::new();
        store.commit_creation(sample_unit(IdempotencyKey::new())).await.unwrap();

        let entries = store.fetch_unpublished(10).await.unwrap();
        store
            .record_publish_failure(entries[0].id, "broker unreachable")
            .await
            .unwrap();

        let entries = store.fetch_unpublished(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, OutboxStatus::Failed);
        assert_eq!(entries[0].retry_count, 1);
        assert_eq!(entries[0].last_error.as_deref(), Some("broker unreachable"));
    }

    #[tokio::test]
    async fn mark_unknown_entry_fails() {
        let store = InMemoryLedgerStore::new();
        let result = store.mark_published(OutboxEntryId::new()).await;
        assert!(matches!(
            result,
            Err(LedgerStoreError::OutboxEntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn audit_entries_filtered_by_entity() {
        let store = InMemoryLedgerStore::new();
        let unit = sample_unit(IdempotencyKey::new());
        let tx_id = unit.transaction.id();
        store.commit_creation(unit).await.unwrap();
        store.commit_creation(sample_unit(IdempotencyKey::new())).await.unwrap();

        let entries = store
            .audit_entries_for("Transaction", &tx_id.to_string())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "Created");
    }

    #[tokio::test]
    async fn reference_directory_checks() {
        let store = InMemoryLedgerStore::new();
        store.register_fund(FundId::new(1)).await;
        store.register_security(SecurityId::new(2)).await;
        store.register_sub_type(TransactionSubTypeId::new(3)).await;

        assert!(store.fund_exists(FundId::new(1)).await.unwrap());
        assert!(!store.fund_exists(FundId::new(9)).await.unwrap());
        assert!(store.security_exists(SecurityId::new(2)).await.unwrap());
        assert!(!store.security_exists(SecurityId::new(9)).await.unwrap());
        assert!(
            store
                .sub_type_exists(TransactionSubTypeId::new(3))
                .await
                .unwrap()
        );
        assert!(
            !store
                .sub_type_exists(TransactionSubTypeId::new(9))
                .await
                .unwrap()
        );
    }
}
