//! Ledger domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{MoneyError, PortError};

/// Errors that can occur in the ledger domain
///
/// Every public operation validates before it mutates, so receiving any of
/// these means the entity graph is exactly as it was before the call.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Operation targets an entry side that is not active for the document
    #[error("Wrong document type: expected {expected}, found {actual}")]
    WrongDocumentType {
        expected: String,
        actual: String,
    },

    /// Owner passed to a document operation has the wrong kind
    #[error("Wrong owner type: expected {expected}, found {actual}")]
    WrongOwnerType {
        expected: String,
        actual: String,
    },

    /// A taxable entry cannot resolve any tax table
    #[error("Tax table not found: {0}")]
    TaxTableNotFound(String),

    /// Document already has payments and is frozen
    #[error("Document is not modifiable: {0}")]
    NotModifiable(String),

    /// Missing, malformed, or contradictory input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Account still owns splits, children, or other references
    #[error("Account in use: {0}")]
    AccountInUse(String),

    /// Document was posted before
    #[error("Document already posted: {0}")]
    AlreadyPosted(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Split not found: {0}")]
    SplitNotFound(String),

    #[error("Lot not found: {0}")]
    LotNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Transaction values do not sum to zero
    #[error("Unbalanced transaction {transaction}: imbalance={imbalance}")]
    UnbalancedTransaction {
        transaction: String,
        imbalance: Decimal,
    },

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PortError),
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(message.into())
    }

    pub fn wrong_document_type(expected: impl ToString, actual: impl ToString) -> Self {
        LedgerError::WrongDocumentType {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn wrong_owner_type(expected: impl ToString, actual: impl ToString) -> Self {
        LedgerError::WrongOwnerType {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result alias used throughout the crate
pub type LedgerResult<T> = Result<T, LedgerError>;
