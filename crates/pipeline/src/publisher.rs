//! Publish capability exposed to the outbox relay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Logical queue for transaction-created events.
pub const TRANSACTION_CREATED_QUEUE: &str = "transaction.created.queue";

/// Logical queue for the index-import collaborator flow.
pub const INDEXER_IMPORT_QUEUE: &str = "indexer.import.queue";

/// Errors that can occur when handing a payload to the transport.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The transport refused or dropped the hand-off.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Delivers a serialized payload to a named destination on the message
/// transport.
///
/// The payload is opaque; a successful return means the transport has
/// confirmed the hand-off. Delivery downstream is at-least-once, so
/// consumers must tolerate duplicates.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a pre-serialized payload to the destination queue,
    /// tagged with its content type.
    async fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<(), PublishError>;
}

/// In-memory publisher implementation for tests and demos.
///
/// Records every published message and can be switched to fail, to
/// exercise the relay's retry bookkeeping.
#[derive(Clone, Default)]
pub struct InMemoryPublisher {
    inner: Arc<PublisherInner>,
}

#[derive(Default)]
struct PublisherInner {
    messages: RwLock<Vec<(String, Vec<u8>)>>,
    fail_on_publish: AtomicBool,
}

impl InMemoryPublisher {
    /// Creates a new empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publish calls fail with a transport error.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.inner.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of published messages.
    pub async fn published_count(&self) -> usize {
        self.inner.messages.read().await.len()
    }

    /// Returns the payloads published to a destination, in order.
    pub async fn messages_for(&self, destination: &str) -> Vec<Vec<u8>> {
        self.inner
            .messages
            .read()
            .await
            .iter()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        _content_type: &str,
    ) -> Result<(), PublishError> {
        if self.inner.fail_on_publish.load(Ordering::SeqCst) {
            return Err(PublishError::Transport(
                "injected transport failure".to_string(),
            ));
        }
        self.inner
            .messages
            .write()
            .await
            .push((destination.to_string(), payload.to_vec()));
        Ok(())
    }
}
