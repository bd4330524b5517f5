//! Creation request consumed by the write coordinator.

use chrono::NaiveDate;
use common::{FundId, IdempotencyKey, SecurityId, TransactionSubTypeId};
use rust_decimal::Decimal;

/// A client request to record one financial movement.
///
/// The idempotency key makes a retried request recognizable as the same
/// logical operation; the optional correlation and request ids are
/// passed through to the domain event and audit trail untouched.
#[derive(Debug, Clone)]
pub struct CreateTransactionRequest {
    pub fund_id: FundId,
    pub security_id: Option<SecurityId>,
    pub sub_type_id: TransactionSubTypeId,
    pub trade_date: NaiveDate,
    pub settle_date: NaiveDate,
    pub quantity: Decimal,
    pub price: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub created_by: String,
    pub idempotency_key: IdempotencyKey,
    pub correlation_id: Option<String>,
    pub request_id: Option<String>,
}
