//! Persisted record types surrounding the transaction row: idempotency
//! mappings, outbox entries, and audit entries.

use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OutboxEntryId, TransactionId};
use domain::LedgerTransaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{LedgerStoreError, Result};

/// Maps a client-supplied idempotency key to at most one transaction.
///
/// Created in the same atomic unit as the transaction it points to;
/// never updated, never deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    /// None marks a partially-written record from a crashed earlier
    /// attempt; lookups treat it as "not yet created".
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Creates a record linking a key to a transaction.
    pub fn new(key: IdempotencyKey, transaction_id: TransactionId) -> Self {
        Self {
            key,
            transaction_id: Some(transaction_id),
            created_at: Utc::now(),
        }
    }
}

/// Processing status of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OutboxStatus {
    /// Awaiting hand-off to the transport.
    #[default]
    Pending,

    /// Confirmed hand-off; the entry is done.
    Published,

    /// Last publish attempt failed; still eligible for retry.
    Failed,
}

impl OutboxStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "Pending",
            OutboxStatus::Published => "Published",
            OutboxStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unrecognized outbox status string.
#[derive(Debug, Clone, Error)]
#[error("Unknown outbox status: {0}")]
pub struct UnknownOutboxStatus(pub String);

impl std::str::FromStr for OutboxStatus {
    type Err = UnknownOutboxStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OutboxStatus::Pending),
            "Published" => Ok(OutboxStatus::Published),
            "Failed" => Ok(OutboxStatus::Failed),
            other => Err(UnknownOutboxStatus(other.to_string())),
        }
    }
}

/// A durable record of one event awaiting delivery to the transport.
///
/// The payload is opaque to the store and immutable after write; only
/// the delivery bookkeeping fields change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: OutboxEntryId,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub occurred_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Creates a new pending entry with the given serialized payload.
    pub fn new(event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: OutboxEntryId::new(),
            event_type: event_type.into(),
            payload,
            occurred_at: Utc::now(),
            status: OutboxStatus::Pending,
            retry_count: 0,
            last_error: None,
            published_at: None,
        }
    }

    /// Marks the entry as published after a confirmed hand-off.
    pub fn mark_published(&mut self) -> Result<()> {
        if self.status == OutboxStatus::Published {
            return Err(LedgerStoreError::AlreadyPublished(self.id));
        }
        self.status = OutboxStatus::Published;
        self.published_at = Some(Utc::now());
        Ok(())
    }

    /// Records a failed publish attempt with the error detail.
    pub fn record_failure(&mut self, error: &str) {
        self.retry_count += 1;
        self.last_error = Some(error.to_string());
        self.status = OutboxStatus::Failed;
    }
}

/// Append-only snapshot of an entity mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_name: String,
    pub entity_id: String,
    pub event_type: String,
    pub performed_by: Option<String>,
    pub data_before: Option<serde_json::Value>,
    pub data_after: Option<serde_json::Value>,
    pub correlation_id: Option<String>,
    pub request_id: Option<String>,
    pub source: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates a new audit entry builder.
    pub fn builder() -> AuditEntryBuilder {
        AuditEntryBuilder::default()
    }
}

/// Builder for constructing audit entries.
#[derive(Debug, Default)]
pub struct AuditEntryBuilder {
    entity_name: Option<String>,
    entity_id: Option<String>,
    event_type: Option<String>,
    performed_by: Option<String>,
    data_before: Option<serde_json::Value>,
    data_after: Option<serde_json::Value>,
    correlation_id: Option<String>,
    request_id: Option<String>,
    source: Option<String>,
}

impl AuditEntryBuilder {
    /// Sets the audited entity's name (e.g. "Transaction").
    pub fn entity_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    /// Sets the audited entity's identifier.
    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Sets the event type (e.g. "Created", "StatusChanged").
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the identity that triggered the event.
    pub fn performed_by(mut self, user: impl Into<String>) -> Self {
        self.performed_by = Some(user.into());
        self
    }

    /// Sets the JSON snapshot of the entity before the change.
    pub fn data_before(mut self, value: serde_json::Value) -> Self {
        self.data_before = Some(value);
        self
    }

    /// Sets the JSON snapshot of the entity after the change.
    pub fn data_after(mut self, value: serde_json::Value) -> Self {
        self.data_after = Some(value);
        self
    }

    /// Sets the correlation id for distributed tracing.
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the request id.
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Sets the source tag (e.g. "API", "Worker").
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builds the audit entry.
    ///
    /// # Panics
    ///
    /// Panics if entity_name, entity_id, or event_type are not set.
    pub fn build(self) -> AuditEntry {
        AuditEntry {
            entity_name: self.entity_name.expect("entity_name is required"),
            entity_id: self.entity_id.expect("entity_id is required"),
            event_type: self.event_type.expect("event_type is required"),
            performed_by: self.performed_by,
            data_before: self.data_before,
            data_after: self.data_after,
            correlation_id: self.correlation_id,
            request_id: self.request_id,
            source: self.source,
            recorded_at: Utc::now(),
        }
    }
}

/// Everything written by one creation unit of work.
///
/// The store commits all four records atomically; on any failure none
/// of them survive.
#[derive(Debug, Clone)]
pub struct CreationUnit {
    pub transaction: LedgerTransaction,
    pub idempotency: IdempotencyRecord,
    pub outbox: OutboxEntry,
    pub audit: AuditEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_entry_starts_pending() {
        let entry = OutboxEntry::new("TransactionCreated", vec![1, 2, 3]);
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert!(entry.last_error.is_none());
        assert!(entry.published_at.is_none());
    }

    #[test]
    fn outbox_mark_published_sets_timestamp() {
        let mut entry = OutboxEntry::new("TransactionCreated", vec![1]);
        entry.mark_published().unwrap();
        assert_eq!(entry.status, OutboxStatus::Published);
        assert!(entry.published_at.is_some());
    }

    #[test]
    fn outbox_mark_published_twice_fails() {
        let mut entry = OutboxEntry::new("TransactionCreated", vec![1]);
        entry.mark_published().unwrap();
        let result = entry.mark_published();
        assert!(matches!(
            result,
            Err(LedgerStoreError::AlreadyPublished(_))
        ));
    }

    #[test]
    fn outbox_record_failure_tracks_attempts() {
        let mut entry = OutboxEntry::new("TransactionCreated", vec![1]);
        entry.record_failure("broker unreachable");
        entry.record_failure("broker unreachable again");

        assert_eq!(entry.status, OutboxStatus::Failed);
        assert_eq!(entry.retry_count, 2);
        assert_eq!(
            entry.last_error.as_deref(),
            Some("broker unreachable again")
        );
    }

    #[test]
    fn outbox_status_parse_roundtrip() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Published,
            OutboxStatus::Failed,
        ] {
            let parsed: OutboxStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("Done".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn audit_entry_builder() {
        let entry = AuditEntry::builder()
            .entity_name("Transaction")
            .entity_id("abc")
            .event_type("Created")
            .performed_by("user-1")
            .data_after(serde_json::json!({"status": "Pending"}))
            .correlation_id("corr-1")
            .source("API")
            .build();

        assert_eq!(entry.entity_name, "Transaction");
        assert_eq!(entry.entity_id, "abc");
        assert_eq!(entry.event_type, "Created");
        assert_eq!(entry.performed_by.as_deref(), Some("user-1"));
        assert!(entry.data_before.is_none());
        assert!(entry.data_after.is_some());
        assert_eq!(entry.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(entry.source.as_deref(), Some("API"));
    }

    #[test]
    #[should_panic(expected = "entity_name is required")]
    fn audit_entry_builder_requires_entity_name() {
        AuditEntry::builder()
            .entity_id("abc")
            .event_type("Created")
            .build();
    }

    #[test]
    fn idempotency_record_links_transaction() {
        let key = IdempotencyKey::new();
        let tx_id = TransactionId::new();
        let record = IdempotencyRecord::new(key, tx_id);
        assert_eq!(record.key, key);
        assert_eq!(record.transaction_id, Some(tx_id));
    }
}
