//! Ledger transaction aggregate and related types.

mod aggregate;
mod events;
mod state;

pub use aggregate::{LedgerTransaction, TransactionDraft};
pub use events::{TransactionCreated, EVENT_CONTENT_TYPE, TRANSACTION_CREATED_EVENT};
pub use state::{TransactionStatus, UnknownStatus};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during ledger transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Currency is not a 3-letter alphabetic ISO code.
    #[error("Invalid currency {given:?}: must be a 3-letter ISO code")]
    InvalidCurrency { given: String },

    /// Trade date falls after the settle date.
    #[error("Trade date {trade} must be on or before settle date {settle}")]
    TradeAfterSettle { trade: NaiveDate, settle: NaiveDate },

    /// Settle date is more than one year in the future.
    #[error("Settle date {settle} is more than one year in the future")]
    SettleTooFarOut { settle: NaiveDate },

    /// Quantity magnitude exceeds the storage precision.
    #[error("Quantity {quantity} exceeds the maximum allowed magnitude")]
    QuantityOutOfRange { quantity: Decimal },

    /// Price is negative.
    #[error("Price {price} cannot be negative")]
    NegativePrice { price: Decimal },

    /// Price magnitude exceeds the storage precision.
    #[error("Price {price} exceeds the maximum allowed magnitude")]
    PriceOutOfRange { price: Decimal },

    /// Amount magnitude exceeds the storage precision.
    #[error("Amount {amount} exceeds the maximum allowed magnitude")]
    AmountOutOfRange { amount: Decimal },

    /// Amount is inconsistent with quantity times price.
    #[error("Amount {amount} does not match quantity {quantity} x price {price}")]
    AmountMismatch {
        quantity: Decimal,
        price: Decimal,
        amount: Decimal,
    },

    /// Creator identity is empty.
    #[error("Creator identity cannot be empty")]
    MissingCreator,

    /// The transaction is not in a status that permits the action.
    #[error("Invalid status transition: cannot {action} from {current} status")]
    InvalidStatusTransition {
        current: TransactionStatus,
        action: &'static str,
    },
}
