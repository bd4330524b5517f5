//! Outbox relay: drains pending outbox entries to the event publisher.

use std::sync::Arc;
use std::time::Duration;

use domain::EVENT_CONTENT_TYPE;
use ledger_store::LedgerStore;

use crate::error::PipelineError;
use crate::publisher::{EventPublisher, TRANSACTION_CREATED_QUEUE};

/// Collaborator contract for the relay: polling cadence, batch size,
/// and the attempt cap past which an entry is dead lettered.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_attempts: i32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 50,
            max_attempts: 10,
        }
    }
}

/// Polls the outbox store and hands payloads to the publisher.
///
/// An entry is marked published strictly after the publisher confirms
/// the hand-off, never before; a failed hand-off records the error and
/// leaves the entry eligible for the next pass. The resulting guarantee
/// is at-least-once delivery: no silent loss, possible duplicates.
pub struct OutboxRelay<S, P> {
    store: Arc<S>,
    publisher: P,
    config: RelayConfig,
}

impl<S, P> OutboxRelay<S, P>
where
    S: LedgerStore,
    P: EventPublisher,
{
    /// Creates a relay with the default configuration.
    pub fn new(store: Arc<S>, publisher: P) -> Self {
        Self::with_config(store, publisher, RelayConfig::default())
    }

    /// Creates a relay with an explicit configuration.
    pub fn with_config(store: Arc<S>, publisher: P, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Runs one drain pass; returns the number of entries published.
    ///
    /// Entries past the attempt cap are skipped and counted as dead
    /// lettered, never deleted; a retention job outside this subsystem
    /// owns their cleanup.
    #[tracing::instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<usize, PipelineError> {
        let entries = self.store.fetch_unpublished(self.config.batch_size).await?;
        let mut published = 0;

        for entry in entries {
            if entry.retry_count >= self.config.max_attempts {
                metrics::counter!("outbox_dead_lettered_total").increment(1);
                tracing::error!(
                    entry_id = %entry.id,
                    retry_count = entry.retry_count,
                    last_error = entry.last_error.as_deref().unwrap_or(""),
                    "outbox entry exceeded attempt cap, dead lettered"
                );
                continue;
            }

            match self
                .publisher
                .publish(TRANSACTION_CREATED_QUEUE, &entry.payload, EVENT_CONTENT_TYPE)
                .await
            {
                Ok(()) => {
                    // Confirmed hand-off first, processed marker second.
                    self.store.mark_published(entry.id).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    tracing::debug!(entry_id = %entry.id, "outbox entry published");
                    published += 1;
                }
                Err(e) => {
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::warn!(entry_id = %entry.id, error = %e, "publish failed");
                    self.store
                        .record_publish_failure(entry.id, &e.to_string())
                        .await?;
                }
            }
        }

        Ok(published)
    }

    /// Runs the relay loop forever, draining once per poll interval.
    ///
    /// Errors are logged and the loop continues; a wedged store or
    /// transport only delays delivery, it never loses entries.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.drain_once().await {
                tracing::warn!(error = %e, "outbox drain pass failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::InMemoryPublisher;
    use ledger_store::{
        AuditEntry, CreationUnit, IdempotencyRecord, InMemoryLedgerStore, OutboxEntry,
    };
    use chrono::NaiveDate;
    use common::{FundId, IdempotencyKey, TransactionId, TransactionSubTypeId};
    use domain::{LedgerTransaction, TransactionDraft};
    use rust_decimal::Decimal;

    fn sample_unit(payload: Vec<u8>) -> CreationUnit {
        let transaction = LedgerTransaction::create(
            TransactionId::new(),
            TransactionDraft {
                fund_id: FundId::new(1),
                security_id: None,
                sub_type_id: TransactionSubTypeId::new(3),
                trade_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                settle_date: NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
                quantity: Decimal::from(10),
                price: Decimal::from(2),
                amount: Decimal::from(20),
                currency: "USD".to_string(),
                created_by: "relay-test".to_string(),
            },
        )
        .unwrap();
        let audit = AuditEntry::builder()
            .entity_name("Transaction")
            .entity_id(transaction.id().to_string())
            .event_type("Created")
            .build();
        CreationUnit {
            idempotency: IdempotencyRecord::new(IdempotencyKey::new(), transaction.id()),
            outbox: OutboxEntry::new("TransactionCreated", payload),
            audit,
            transaction,
        }
    }

    fn setup() -> (
        OutboxRelay<InMemoryLedgerStore, InMemoryPublisher>,
        Arc<InMemoryLedgerStore>,
        InMemoryPublisher,
    ) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let publisher = InMemoryPublisher::new();
        let relay = OutboxRelay::with_config(
            store.clone(),
            publisher.clone(),
            RelayConfig {
                poll_interval: Duration::from_millis(10),
                batch_size: 10,
                max_attempts: 2,
            },
        );
        (relay, store, publisher)
    }

    #[tokio::test]
    async fn drain_publishes_and_marks_entries() {
        let (relay, store, publisher) = setup();
        store.commit_creation(sample_unit(vec![1])).await.unwrap();
        store.commit_creation(sample_unit(vec![2])).await.unwrap();

        let published = relay.drain_once().await.unwrap();

        assert_eq!(published, 2);
        assert_eq!(store.published_count().await, 2);
        let messages = publisher.messages_for(TRANSACTION_CREATED_QUEUE).await;
        assert_eq!(messages, vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn drain_is_idempotent_once_published() {
        let (relay, store, publisher) = setup();
        store.commit_creation(sample_unit(vec![1])).await.unwrap();

        assert_eq!(relay.drain_once().await.unwrap(), 1);
        assert_eq!(relay.drain_once().await.unwrap(), 0);
        assert_eq!(store.published_count().await, 1);
        assert_eq!(publisher.published_count().await, 1);
    }

    #[tokio::test]
    async fn failed_publish_keeps_entry_for_retry() {
        let (relay, store, publisher) = setup();
        store.commit_creation(sample_unit(vec![1])).await.unwrap();

        publisher.set_fail_on_publish(true);
        assert_eq!(relay.drain_once().await.unwrap(), 0);
        assert_eq!(store.published_count().await, 0);

        let entries = store.fetch_unpublished(10).await.unwrap();
        assert_eq!(entries[0].retry_count, 1);
        assert!(entries[0].last_error.is_some());

        publisher.set_fail_on_publish(false);
        assert_eq!(relay.drain_once().await.unwrap(), 1);
        assert_eq!(store.published_count().await, 1);
    }

    #[tokio::test]
    async fn entries_past_attempt_cap_are_dead_lettered() {
        let (relay, store, publisher) = setup();
        store.commit_creation(sample_unit(vec![1])).await.unwrap();

        publisher.set_fail_on_publish(true);
        relay.drain_once().await.unwrap();
        relay.drain_once().await.unwrap();

        // retry_count reached max_attempts; the entry is now skipped
        // even with a healthy transport.
        publisher.set_fail_on_publish(false);
        assert_eq!(relay.drain_once().await.unwrap(), 0);
        assert_eq!(store.published_count().await, 0);
        assert_eq!(publisher.published_count().await, 0);
    }

    #[tokio::test]
    async fn batch_size_bounds_each_pass() {
        let (relay, store, _) = setup();
        for i in 0..15u8 {
            store.commit_creation(sample_unit(vec![i])).await.unwrap();
        }

        assert_eq!(relay.drain_once().await.unwrap(), 10);
        assert_eq!(relay.drain_once().await.unwrap(), 5);
        assert_eq!(store.published_count().await, 15);
    }
}
