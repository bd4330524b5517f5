//! Transaction processor: drives pending transactions to a terminal status.

use std::sync::Arc;

use common::TransactionId;
use ledger_store::{AuditEntry, LedgerStore, LedgerStoreError};

use crate::error::PipelineError;

/// Outcome of processing one transaction notification.
///
/// Expected business results are variants, not errors: a duplicate or
/// out-of-order delivery for an already-terminal transaction reports
/// `Rejected` and changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The transaction passed re-validation and is now `Executed`.
    Succeeded,

    /// No transition happened: the transaction was already terminal, a
    /// concurrent processor won the transition, or validation rejected
    /// it (in which case it is now `Failed`).
    Rejected { reason: String },

    /// No transaction with the given id exists.
    NotFound,
}

/// Consumes created notifications and settles transactions.
///
/// Safe to invoke more than once for the same transaction id: the
/// status guard turns duplicate delivery into a no-op, which the
/// at-least-once upstream delivery requires.
pub struct TransactionProcessor<S> {
    store: Arc<S>,
}

impl<S> TransactionProcessor<S>
where
    S: LedgerStore,
{
    /// Creates a new processor over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Re-validates a pending transaction and moves it to a terminal
    /// status.
    ///
    /// On validation success the transaction becomes `Executed`; on a
    /// recognized validation failure it becomes `Failed` with the reason
    /// captured in the audit snapshot; it is never left `Pending` in
    /// either case. Unexpected storage faults propagate as errors and
    /// leave the status untouched for a later retry.
    #[tracing::instrument(skip(self), fields(%transaction_id))]
    pub async fn process(
        &self,
        transaction_id: TransactionId,
        correlation_id: Option<String>,
    ) -> Result<ProcessOutcome, PipelineError> {
        let Some(transaction) = self.store.get_transaction(transaction_id).await? else {
            metrics::counter!("transactions_processed_total", "outcome" => "not_found")
                .increment(1);
            tracing::warn!("transaction not found");
            return Ok(ProcessOutcome::NotFound);
        };

        if !transaction.status().can_process() {
            metrics::counter!("transactions_processed_total", "outcome" => "duplicate")
                .increment(1);
            tracing::info!(
                status = %transaction.status(),
                "transaction already terminal, treating redelivery as no-op"
            );
            return Ok(ProcessOutcome::Rejected {
                reason: format!(
                    "transaction is {} and cannot be reprocessed",
                    transaction.status()
                ),
            });
        }

        let before = serde_json::to_value(&transaction)?;

        match transaction.revalidate() {
            Ok(()) => {
                let mut updated = transaction.clone();
                updated.execute()?;

                let audit = self.transition_audit(
                    &before,
                    serde_json::json!({ "transaction": serde_json::to_value(&updated)? }),
                    &updated.id(),
                    correlation_id,
                );

                match self.store.commit_transition(&updated, audit).await {
                    Ok(()) => {
                        metrics::counter!("transactions_processed_total", "outcome" => "executed")
                            .increment(1);
                        tracing::info!("transaction executed");
                        Ok(ProcessOutcome::Succeeded)
                    }
                    Err(LedgerStoreError::TransitionConflict { status, .. }) => {
                        Ok(ProcessOutcome::Rejected {
                            reason: format!("concurrent transition won, status is {status}"),
                        })
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(validation_error) => {
                let reason = validation_error.to_string();
                let mut updated = transaction.clone();
                updated.reject()?;

                let audit = self.transition_audit(
                    &before,
                    serde_json::json!({
                        "transaction": serde_json::to_value(&updated)?,
                        "failure_reason": reason,
                    }),
                    &updated.id(),
                    correlation_id,
                );

                match self.store.commit_transition(&updated, audit).await {
                    Ok(()) => {
                        metrics::counter!("transactions_processed_total", "outcome" => "failed")
                            .increment(1);
                        tracing::warn!(%reason, "transaction failed validation");
                        Ok(ProcessOutcome::Rejected { reason })
                    }
                    Err(LedgerStoreError::TransitionConflict { status, .. }) => {
                        Ok(ProcessOutcome::Rejected {
                            reason: format!("concurrent transition won, status is {status}"),
                        })
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn transition_audit(
        &self,
        before: &serde_json::Value,
        after: serde_json::Value,
        transaction_id: &TransactionId,
        correlation_id: Option<String>,
    ) -> AuditEntry {
        let mut builder = AuditEntry::builder()
            .entity_name("Transaction")
            .entity_id(transaction_id.to_string())
            .event_type("StatusChanged")
            .data_before(before.clone())
            .data_after(after)
            .source("Worker");
        if let Some(correlation_id) = correlation_id {
            builder = builder.correlation_id(correlation_id);
        }
        builder.build()
    }
}
