//! Domain-specific errors for the ledger balance engine.
//!
//! Contains error variants for common failure cases like:
//! - Lookup failures (account or transaction not found)
//! - Authorization and lifecycle failures (not owner, inactive account)
//! - Transaction validation errors (insufficient balance, refund eligibility)
//! - Store failures (timeouts, backend errors)
//!
//! Every operation returns these as typed results. Nothing in the core retries
//! a failed store call.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("account not found")]
    AccountNotFound,
    #[error("transaction not found")]
    TransactionNotFound,
    #[error("acting user does not own the account")]
    NotOwner,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("duplicate transaction id")]
    DuplicateTransaction,
    #[error("only transfers can be refunded")]
    NotRefundable,
    #[error("transfer has already been refunded")]
    AlreadyRefunded,
    #[error("account still holds a balance")]
    HasBalance,
    #[error("account is inactive")]
    AccountInactive,
    #[error("unknown transaction kind: {0}")]
    UnknownTransactionKind(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
