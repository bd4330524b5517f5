//! Ledger transaction aggregate implementation.

use chrono::{DateTime, Months, NaiveDate, Utc};
use common::{FundId, SecurityId, TransactionId, TransactionSubTypeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{TransactionError, TransactionStatus};

/// Largest magnitude accepted for quantity and price (NUMERIC(28, 8)).
fn max_unit_magnitude() -> Decimal {
    Decimal::from_i128_with_scale(999_999_999_999_999_999, 8)
}

/// Largest magnitude accepted for the total amount (NUMERIC(28, 2)).
fn max_amount_magnitude() -> Decimal {
    Decimal::from_i128_with_scale(999_999_999_999_999_999, 2)
}

/// Rounding tolerance for the quantity x price = amount consistency check.
fn amount_tolerance() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// Field values for a ledger transaction before construction.
///
/// Carries exactly what the client submits; the aggregate's constructor
/// owns validation and normalization.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
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
}

/// Ledger transaction aggregate root.
///
/// Represents one financial movement. The status only ever moves forward
/// through the state machine (`Pending → Executed | Failed`); once
/// terminal, the row is immutable apart from timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    id: TransactionId,
    fund_id: FundId,
    security_id: Option<SecurityId>,
    sub_type_id: TransactionSubTypeId,
    trade_date: NaiveDate,
    settle_date: NaiveDate,
    quantity: Decimal,
    price: Decimal,
    amount: Decimal,
    currency: String,
    status: TransactionStatus,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Creates a new pending transaction, validating structural rules.
    ///
    /// Reference existence (fund, security, sub-type) is the caller's
    /// responsibility; this constructor only checks field-level rules.
    pub fn create(id: TransactionId, draft: TransactionDraft) -> Result<Self, TransactionError> {
        validate_dates(draft.trade_date, draft.settle_date)?;
        validate_quantity(draft.quantity)?;
        validate_price(draft.price)?;
        validate_amount(draft.amount)?;
        let currency = normalize_currency(&draft.currency)?;
        let created_by = draft.created_by.trim();
        if created_by.is_empty() {
            return Err(TransactionError::MissingCreator);
        }

        let now = Utc::now();
        Ok(Self {
            id,
            fund_id: draft.fund_id,
            security_id: draft.security_id,
            sub_type_id: draft.sub_type_id,
            trade_date: draft.trade_date,
            settle_date: draft.settle_date,
            quantity: draft.quantity,
            price: draft.price,
            amount: draft.amount,
            currency,
            status: TransactionStatus::Pending,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Re-runs the full domain validation against the current field values.
    ///
    /// Runs the structural rule set again plus the cross-field consistency
    /// check deferred at creation time: for a non-zero quantity, the amount
    /// must equal quantity x price within a rounding tolerance of 0.01.
    pub fn revalidate(&self) -> Result<(), TransactionError> {
        validate_dates(self.trade_date, self.settle_date)?;
        validate_quantity(self.quantity)?;
        validate_price(self.price)?;
        validate_amount(self.amount)?;
        normalize_currency(&self.currency)?;

        if !self.quantity.is_zero() {
            let expected = self.quantity * self.price;
            if (expected - self.amount).abs() > amount_tolerance() {
                return Err(TransactionError::AmountMismatch {
                    quantity: self.quantity,
                    price: self.price,
                    amount: self.amount,
                });
            }
        }

        Ok(())
    }

    /// Transitions the transaction to `Executed`.
    pub fn execute(&mut self) -> Result<(), TransactionError> {
        if !self.status.can_process() {
            return Err(TransactionError::InvalidStatusTransition {
                current: self.status,
                action: "execute",
            });
        }
        self.status = TransactionStatus::Executed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transitions the transaction to `Failed`.
    pub fn reject(&mut self) -> Result<(), TransactionError> {
        if !self.status.can_process() {
            return Err(TransactionError::InvalidStatusTransition {
                current: self.status,
                action: "reject",
            });
        }
        self.status = TransactionStatus::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// Query methods
impl LedgerTransaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn fund_id(&self) -> FundId {
        self.fund_id
    }

    pub fn security_id(&self) -> Option<SecurityId> {
        self.security_id
    }

    pub fn sub_type_id(&self) -> TransactionSubTypeId {
        self.sub_type_id
    }

    pub fn trade_date(&self) -> NaiveDate {
        self.trade_date
    }

    pub fn settle_date(&self) -> NaiveDate {
        self.settle_date
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Normalized 3-letter ISO currency code.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the transaction is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Reconstruction from storage; not part of the public creation path.
impl LedgerTransaction {
    /// Rebuilds an aggregate from already-persisted field values.
    ///
    /// Skips creation-time validation: the row was validated when first
    /// written and may legitimately carry values (e.g. an old settle date)
    /// that would no longer pass the time-dependent checks.
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        id: TransactionId,
        fund_id: FundId,
        security_id: Option<SecurityId>,
        sub_type_id: TransactionSubTypeId,
        trade_date: NaiveDate,
        settle_date: NaiveDate,
        quantity: Decimal,
        price: Decimal,
        amount: Decimal,
        currency: String,
        status: TransactionStatus,
        created_by: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            fund_id,
            security_id,
            sub_type_id,
            trade_date,
            settle_date,
            quantity,
            price,
            amount,
            currency,
            status,
            created_by,
            created_at,
            updated_at,
        }
    }
}

fn validate_dates(trade: NaiveDate, settle: NaiveDate) -> Result<(), TransactionError> {
    if trade > settle {
        return Err(TransactionError::TradeAfterSettle { trade, settle });
    }
    let horizon = Utc::now().date_naive() + Months::new(12);
    if settle > horizon {
        return Err(TransactionError::SettleTooFarOut { settle });
    }
    Ok(())
}

fn validate_quantity(quantity: Decimal) -> Result<(), TransactionError> {
    if quantity.abs() > max_unit_magnitude() {
        return Err(TransactionError::QuantityOutOfRange { quantity });
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), TransactionError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(TransactionError::NegativePrice { price });
    }
    if price > max_unit_magnitude() {
        return Err(TransactionError::PriceOutOfRange { price });
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<(), TransactionError> {
    if amount.abs() > max_amount_magnitude() {
        return Err(TransactionError::AmountOutOfRange { amount });
    }
    Ok(())
}

fn normalize_currency(currency: &str) -> Result<String, TransactionError> {
    let trimmed = currency.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(TransactionError::InvalidCurrency {
            given: currency.to_string(),
        });
    }
    Ok(trimmed.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TransactionDraft {
        TransactionDraft {
            fund_id: FundId::new(1),
            security_id: Some(SecurityId::new(10)),
            sub_type_id: TransactionSubTypeId::new(3),
            trade_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            settle_date: NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
            quantity: Decimal::from(1000),
            price: "28.50".parse().unwrap(),
            amount: Decimal::from(28_500),
            currency: "BRL".to_string(),
            created_by: "user-1".to_string(),
        }
    }

    #[test]
    fn test_create_valid_transaction() {
        let id = TransactionId::new();
        let tx = LedgerTransaction::create(id, draft()).unwrap();

        assert_eq!(tx.id(), id);
        assert_eq!(tx.status(), TransactionStatus::Pending);
        assert_eq!(tx.currency(), "BRL");
        assert_eq!(tx.created_by(), "user-1");
        assert!(!tx.is_terminal());
    }

    #[test]
    fn test_create_normalizes_currency() {
        let mut d = draft();
        d.currency = " brl ".to_string();
        let tx = LedgerTransaction::create(TransactionId::new(), d).unwrap();
        assert_eq!(tx.currency(), "BRL");
    }

    #[test]
    fn test_create_rejects_bad_currency() {
        for bad in ["", "BR", "BRLX", "B1L"] {
            let mut d = draft();
            d.currency = bad.to_string();
            let result = LedgerTransaction::create(TransactionId::new(), d);
            assert!(matches!(
                result,
                Err(TransactionError::InvalidCurrency { .. })
            ));
        }
    }

    #[test]
    fn test_create_rejects_trade_after_settle() {
        let mut d = draft();
        d.trade_date = NaiveDate::from_ymd_opt(2026, 7, 10).unwrap();
        let result = LedgerTransaction::create(TransactionId::new(), d);
        assert!(matches!(
            result,
            Err(TransactionError::TradeAfterSettle { .. })
        ));
    }

    #[test]
    fn test_create_rejects_settle_too_far_out() {
        let mut d = draft();
        d.trade_date = Utc::now().date_naive();
        d.settle_date = Utc::now().date_naive() + Months::new(24);
        let result = LedgerTransaction::create(TransactionId::new(), d);
        assert!(matches!(
            result,
            Err(TransactionError::SettleTooFarOut { .. })
        ));
    }

    #[test]
    fn test_create_rejects_quantity_out_of_range() {
        let mut d = draft();
        d.quantity = Decimal::from_i128_with_scale(1_999_999_999_999_999_999, 8);
        let result = LedgerTransaction::create(TransactionId::new(), d);
        assert!(matches!(
            result,
            Err(TransactionError::QuantityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_create_rejects_negative_price() {
        let mut d = draft();
        d.price = Decimal::from(-1);
        let result = LedgerTransaction::create(TransactionId::new(), d);
        assert!(matches!(result, Err(TransactionError::NegativePrice { .. })));
    }

    #[test]
    fn test_create_rejects_amount_out_of_range() {
        let mut d = draft();
        d.amount = Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 2);
        let result = LedgerTransaction::create(TransactionId::new(), d);
        assert!(matches!(
            result,
            Err(TransactionError::AmountOutOfRange { .. })
        ));
    }

    #[test]
    fn test_create_rejects_empty_creator() {
        let mut d = draft();
        d.created_by = "   ".to_string();
        let result = LedgerTransaction::create(TransactionId::new(), d);
        assert!(matches!(result, Err(TransactionError::MissingCreator)));
    }

    #[test]
    fn test_negative_quantity_is_allowed() {
        // Sells are recorded as negative movements.
        let mut d = draft();
        d.quantity = Decimal::from(-1000);
        d.amount = Decimal::from(-28_500);
        let tx = LedgerTransaction::create(TransactionId::new(), d).unwrap();
        assert_eq!(tx.quantity(), Decimal::from(-1000));
    }

    #[test]
    fn test_execute_transitions_to_executed() {
        let mut tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
        tx.execute().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Executed);
        assert!(tx.is_terminal());
    }

    #[test]
    fn test_execute_twice_fails() {
        let mut tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
        tx.execute().unwrap();
        let result = tx.execute();
        assert!(matches!(
            result,
            Err(TransactionError::InvalidStatusTransition { .. })
        ));
        assert_eq!(tx.status(), TransactionStatus::Executed);
    }

    #[test]
    fn test_reject_transitions_to_failed() {
        let mut tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
        tx.reject().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Failed);
        assert!(tx.is_terminal());
    }

    #[test]
    fn test_reject_after_execute_fails() {
        let mut tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
        tx.execute().unwrap();
        let result = tx.reject();
        assert!(matches!(
            result,
            Err(TransactionError::InvalidStatusTransition { .. })
        ));
        assert_eq!(tx.status(), TransactionStatus::Executed);
    }

    #[test]
    fn test_revalidate_accepts_consistent_fields() {
        let tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
        assert!(tx.revalidate().is_ok());
    }

    #[test]
    fn test_revalidate_rejects_amount_mismatch() {
        let mut d = draft();
        d.amount = Decimal::from(99_999); // 1000 x 28.50 = 28500
        let tx = LedgerTransaction::create(TransactionId::new(), d).unwrap();
        let result = tx.revalidate();
        assert!(matches!(
            result,
            Err(TransactionError::AmountMismatch { .. })
        ));
    }

    #[test]
    fn test_revalidate_tolerates_rounding() {
        let mut d = draft();
        d.amount = "28500.01".parse().unwrap();
        let tx = LedgerTransaction::create(TransactionId::new(), d).unwrap();
        assert!(tx.revalidate().is_ok());
    }

    #[test]
    fn test_revalidate_skips_consistency_for_zero_quantity() {
        // Cash movements carry an amount with no quantity or price.
        let mut d = draft();
        d.quantity = Decimal::ZERO;
        d.price = Decimal::ZERO;
        d.amount = Decimal::from(500);
        let tx = LedgerTransaction::create(TransactionId::new(), d).unwrap();
        assert!(tx.revalidate().is_ok());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
        let json = serde_json::to_string(&tx).unwrap();
        let deserialized: LedgerTransaction = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id(), tx.id());
        assert_eq!(deserialized.status(), tx.status());
        assert_eq!(deserialized.amount(), tx.amount());
        assert_eq!(deserialized.currency(), tx.currency());
    }
}
