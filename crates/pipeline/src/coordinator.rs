//! Write coordinator for the creation unit of work.

use std::sync::Arc;

use common::TransactionId;
use domain::{
    LedgerTransaction, TransactionCreated, TransactionDraft, TRANSACTION_CREATED_EVENT,
};
use ledger_store::{
    AuditEntry, CreationUnit, IdempotencyRecord, LedgerStore, LedgerStoreError, OutboxEntry,
    ReferenceDirectory,
};

use crate::error::PipelineError;
use crate::request::CreateTransactionRequest;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Orchestrates transaction creation as one retryable atomic unit of work.
///
/// The sequence is: idempotency lookup (commit-free replay on a hit),
/// foreign-reference validation, aggregate construction, event
/// serialization, then a single atomic commit of the transaction row,
/// idempotency record, outbox entry, and audit entry. On a transient
/// storage fault the whole sequence is replayed, which the idempotency
/// guard makes safe; on a lost unique-key race the winner's transaction
/// is replayed instead of surfacing an error.
pub struct WriteCoordinator<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> WriteCoordinator<S>
where
    S: LedgerStore + ReferenceDirectory,
{
    /// Creates a coordinator with the default retry policy.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Creates a coordinator with an explicit retry policy.
    pub fn with_retry_policy(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Records a transaction, exactly once per idempotency key.
    ///
    /// A retried request with a known key receives the original
    /// transaction back, never a duplicate ledger entry and never an
    /// error for the retry itself.
    #[tracing::instrument(
        skip(self, request),
        fields(idempotency_key = %request.idempotency_key, fund_id = %request.fund_id)
    )]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<LedgerTransaction, PipelineError> {
        retry_with_backoff(&self.retry, PipelineError::is_transient, || {
            self.try_create(&request)
        })
        .await
    }

    async fn try_create(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<LedgerTransaction, PipelineError> {
        // 1. Idempotency guard: a key linked to a transaction replays it
        // without any write. A record with no linked transaction is a
        // partially-written leftover and is treated as not yet created.
        if let Some(record) = self.store.find_idempotency(request.idempotency_key).await?
            && let Some(existing_id) = record.transaction_id
        {
            metrics::counter!("transactions_replayed_total").increment(1);
            tracing::info!(%existing_id, "idempotent request detected, replaying");
            return self
                .store
                .get_transaction(existing_id)
                .await?
                .ok_or(PipelineError::DanglingIdempotency(request.idempotency_key));
        }

        // 2. Foreign references must exist before anything is written.
        if !self.store.fund_exists(request.fund_id).await? {
            return Err(PipelineError::FundNotFound(request.fund_id));
        }
        if let Some(security_id) = request.security_id
            && !self.store.security_exists(security_id).await?
        {
            return Err(PipelineError::SecurityNotFound(security_id));
        }
        if !self.store.sub_type_exists(request.sub_type_id).await? {
            return Err(PipelineError::SubTypeNotFound(request.sub_type_id));
        }

        // 3. Construct the aggregate in Pending with its identifier, so
        // the domain event can be serialized before the commit.
        let transaction = LedgerTransaction::create(
            TransactionId::new(),
            TransactionDraft {
                fund_id: request.fund_id,
                security_id: request.security_id,
                sub_type_id: request.sub_type_id,
                trade_date: request.trade_date,
                settle_date: request.settle_date,
                quantity: request.quantity,
                price: request.price,
                amount: request.amount,
                currency: request.currency.clone(),
                created_by: request.created_by.clone(),
            },
        )?;

        // 4. Build and serialize the domain event to its wire format.
        let event = TransactionCreated::from_transaction(
            &transaction,
            request.correlation_id.clone(),
            request.request_id.clone(),
        );
        let payload = event.to_payload();

        // 5. Assemble the unit of work: idempotency record, outbox
        // entry, and creation audit snapshot.
        let mut audit_builder = AuditEntry::builder()
            .entity_name("Transaction")
            .entity_id(transaction.id().to_string())
            .event_type("Created")
            .performed_by(transaction.created_by())
            .data_after(serde_json::to_value(&transaction)?)
            .source("API");
        if let Some(ref correlation_id) = request.correlation_id {
            audit_builder = audit_builder.correlation_id(correlation_id.clone());
        }
        if let Some(ref request_id) = request.request_id {
            audit_builder = audit_builder.request_id(request_id.clone());
        }
        let audit = audit_builder.build();

        let unit = CreationUnit {
            idempotency: IdempotencyRecord::new(request.idempotency_key, transaction.id()),
            outbox: OutboxEntry::new(TRANSACTION_CREATED_EVENT, payload),
            audit,
            transaction: transaction.clone(),
        };

        // 6. Commit atomically. A unique-key violation means a
        // concurrent creator with the same key won; replay its result.
        match self.store.commit_creation(unit).await {
            Ok(()) => {
                metrics::counter!("transactions_created_total").increment(1);
                tracing::info!(
                    transaction_id = %transaction.id(),
                    amount = %transaction.amount(),
                    "transaction recorded"
                );
                Ok(transaction)
            }
            Err(LedgerStoreError::DuplicateIdempotencyKey(key)) => {
                metrics::counter!("transactions_creation_races_total").increment(1);
                tracing::info!(%key, "lost idempotency race, replaying winner");
                let record = self
                    .store
                    .find_idempotency(key)
                    .await?
                    .ok_or(PipelineError::DanglingIdempotency(key))?;
                let winner_id = record
                    .transaction_id
                    .ok_or(PipelineError::DanglingIdempotency(key))?;
                self.store
                    .get_transaction(winner_id)
                    .await?
                    .ok_or(PipelineError::DanglingIdempotency(key))
            }
            Err(e) => Err(e.into()),
        }
    }
}
