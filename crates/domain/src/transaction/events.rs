//! Transaction-created domain event and its binary wire format.

use chrono::Utc;
use prost::Message;

use super::LedgerTransaction;

/// Event type tag recorded on outbox entries.
pub const TRANSACTION_CREATED_EVENT: &str = "TransactionCreated";

/// Content type of the serialized payload.
pub const EVENT_CONTENT_TYPE: &str = "application/protobuf";

/// Domain event raised when a ledger transaction is created.
///
/// Self-contained: carries every field of the originating transaction so
/// downstream consumers never have to read the ledger back. Serialized
/// with Protocol Buffers; dates and decimals travel as strings to keep
/// exact values across language boundaries, timestamps as epoch
/// milliseconds.
#[derive(Clone, PartialEq, Message)]
pub struct TransactionCreated {
    /// Identifier of the created transaction (UUID).
    #[prost(string, tag = "1")]
    pub transaction_id: String,

    #[prost(int32, tag = "2")]
    pub fund_id: i32,

    #[prost(int32, optional, tag = "3")]
    pub security_id: Option<i32>,

    #[prost(int32, tag = "4")]
    pub sub_type_id: i32,

    /// ISO-8601 calendar date (`YYYY-MM-DD`).
    #[prost(string, tag = "5")]
    pub trade_date: String,

    /// ISO-8601 calendar date (`YYYY-MM-DD`).
    #[prost(string, tag = "6")]
    pub settle_date: String,

    /// Exact decimal rendered as a string.
    #[prost(string, tag = "7")]
    pub quantity: String,

    /// Exact decimal rendered as a string.
    #[prost(string, tag = "8")]
    pub price: String,

    /// Exact decimal rendered as a string.
    #[prost(string, tag = "9")]
    pub amount: String,

    /// ISO 4217 currency code.
    #[prost(string, tag = "10")]
    pub currency: String,

    /// Status name at event time (always `Pending` for creation events).
    #[prost(string, tag = "11")]
    pub status: String,

    #[prost(string, tag = "12")]
    pub created_by: String,

    /// Transaction creation time, epoch milliseconds UTC.
    #[prost(int64, tag = "13")]
    pub created_at_ms: i64,

    /// Correlation id for distributed tracing, passed through from the caller.
    #[prost(string, optional, tag = "14")]
    pub correlation_id: Option<String>,

    /// Request id passed through from the caller.
    #[prost(string, optional, tag = "15")]
    pub request_id: Option<String>,

    /// Event emission time, epoch milliseconds UTC.
    #[prost(int64, tag = "16")]
    pub occurred_at_ms: i64,
}

impl TransactionCreated {
    /// Builds the event from a freshly created transaction.
    pub fn from_transaction(
        tx: &LedgerTransaction,
        correlation_id: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            transaction_id: tx.id().to_string(),
            fund_id: tx.fund_id().as_i32(),
            security_id: tx.security_id().map(|s| s.as_i32()),
            sub_type_id: tx.sub_type_id().as_i32(),
            trade_date: tx.trade_date().to_string(),
            settle_date: tx.settle_date().to_string(),
            quantity: tx.quantity().to_string(),
            price: tx.price().to_string(),
            amount: tx.amount().to_string(),
            currency: tx.currency().to_string(),
            status: tx.status().as_str().to_string(),
            created_by: tx.created_by().to_string(),
            created_at_ms: tx.created_at().timestamp_millis(),
            correlation_id,
            request_id,
            occurred_at_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Serializes the event to the fixed binary wire format.
    pub fn to_payload(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserializes an event from the wire format.
    pub fn from_payload(buf: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(buf)
    }
}
