//! Transactions and splits
//!
//! A transaction is a dated set of splits whose values sum to zero in the
//! transaction currency. Splits are never edited one at a time: the entity
//! store only creates and adjusts them in balanced pairs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AccountId, Currency, DocumentId, LotId, Money, SplitId, TransactionId};

/// Action tag carried by a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitAction {
    /// Posting split of a customer invoice
    Invoice,
    /// Posting split of a vendor bill
    Bill,
    /// Posting split of an employee voucher
    Voucher,
    /// Settlement of a document
    Payment,
    /// Anything not tied to a document
    Generic,
}

impl SplitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitAction::Invoice => "Invoice",
            SplitAction::Bill => "Bill",
            SplitAction::Voucher => "Expense voucher",
            SplitAction::Payment => "Payment",
            SplitAction::Generic => "",
        }
    }
}

impl fmt::Display for SplitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a transaction, booked against one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub id: SplitId,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    /// Amount in the transaction currency
    pub value: Money,
    /// Amount in the account currency
    pub quantity: Money,
    pub action: SplitAction,
    pub memo: Option<String>,
    pub lot_id: Option<LotId>,
}

/// A dated, balanced set of splits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub currency: Currency,
    /// Free-form number (document number for posting transactions)
    pub number: Option<String>,
    pub description: String,
    pub date_entered: DateTime<Utc>,
    pub date_posted: NaiveDate,
    /// Splits in creation order
    pub splits: Vec<SplitId>,
    /// Set when this is the posting transaction of a document
    pub document_id: Option<DocumentId>,
}

impl Transaction {
    /// Creates an empty transaction
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier
    /// * `currency` - Currency all split values are expressed in
    /// * `description` - Description of the transaction
    /// * `date_posted` - Accounting date
    pub fn new(
        id: TransactionId,
        currency: Currency,
        description: impl Into<String>,
        date_posted: NaiveDate,
    ) -> Self {
        Self {
            id,
            currency,
            number: None,
            description: description.into(),
            date_entered: Utc::now(),
            date_posted,
            splits: Vec::new(),
            document_id: None,
        }
    }
}

/// Everything needed to create a split except its amount
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDraft {
    pub account_id: AccountId,
    pub action: SplitAction,
    pub memo: Option<String>,
    pub lot_id: Option<LotId>,
    /// Quantity per unit of value; required when the account currency
    /// differs from the transaction currency
    pub price: Option<rust_decimal::Decimal>,
}

impl SplitDraft {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            action: SplitAction::Generic,
            memo: None,
            lot_id: None,
            price: None,
        }
    }

    pub fn with_action(mut self, action: SplitAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn in_lot(mut self, lot_id: LotId) -> Self {
        self.lot_id = Some(lot_id);
        self
    }

    /// Exchange rate from transaction currency into account currency
    pub fn at_price(mut self, price: rust_decimal::Decimal) -> Self {
        self.price = Some(price);
        self
    }
}

/// Either side of a balanced value move
#[derive(Debug, Clone, PartialEq)]
pub enum SplitTarget {
    Existing(SplitId),
    New(SplitDraft),
}
