//! Transaction status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a ledger transaction in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──┬──► Executed
///           └──► Failed
/// ```
///
/// `Executed` and `Failed` are terminal; no further transitions are
/// permitted once either is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionStatus {
    /// Recorded but not yet validated by the processor.
    #[default]
    Pending,

    /// Validation passed; the movement is settled (terminal).
    Executed,

    /// Validation rejected the movement (terminal).
    Failed,
}

impl TransactionStatus {
    /// Returns true if the processor may act on a transaction in this status.
    pub fn can_process(&self) -> bool {
        matches!(self, TransactionStatus::Pending)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Executed | TransactionStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Executed => "Executed",
            TransactionStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unrecognized status string.
#[derive(Debug, Clone, Error)]
#[error("Unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TransactionStatus::Pending),
            "Executed" => Ok(TransactionStatus::Executed),
            "Failed" => Ok(TransactionStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
