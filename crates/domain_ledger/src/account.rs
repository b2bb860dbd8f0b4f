//! Accounts and the account tree
//!
//! Accounts form a single tree below one root account. The tree itself is
//! maintained by the entity store; this module only defines the record and
//! the per-type rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AccountId, Currency};

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Top of the tree; exactly one per ledger
    Root,
    Asset,
    Bank,
    Cash,
    /// Accounts receivable, used as post account for customer documents
    Receivable,
    Liability,
    /// Accounts payable, used as post account for vendor/employee documents
    Payable,
    Credit,
    Equity,
    Income,
    Expense,
}

impl AccountType {
    /// Returns true if this account type has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        matches!(
            self,
            AccountType::Asset
                | AccountType::Bank
                | AccountType::Cash
                | AccountType::Receivable
                | AccountType::Expense
        )
    }

    /// Receivable/payable accounts may own lots
    pub fn is_ar_ap(&self) -> bool {
        matches!(self, AccountType::Receivable | AccountType::Payable)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountType::Root => "ROOT",
            AccountType::Asset => "ASSET",
            AccountType::Bank => "BANK",
            AccountType::Cash => "CASH",
            AccountType::Receivable => "RECEIVABLE",
            AccountType::Liability => "LIABILITY",
            AccountType::Payable => "PAYABLE",
            AccountType::Credit => "CREDIT",
            AccountType::Equity => "EQUITY",
            AccountType::Income => "INCOME",
            AccountType::Expense => "EXPENSE",
        };
        f.write_str(name)
    }
}

/// An account in the chart of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,
    /// Account code (e.g., "1200")
    pub code: String,
    /// Account name
    pub name: String,
    /// Account type
    pub account_type: AccountType,
    /// Commodity the account's split quantities are held in
    pub currency: Currency,
    /// Smallest tradable fraction of the commodity (100 = cents)
    pub fraction: i64,
    /// Parent account; `None` only for the root
    pub parent_id: Option<AccountId>,
    /// Child accounts in insertion order
    pub children: Vec<AccountId>,
    /// Description
    pub description: Option<String>,
}

impl Account {
    /// Creates a new account below the root
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier
    /// * `code` - Account code
    /// * `name` - Account name
    /// * `account_type` - Type of account
    /// * `currency` - Commodity of the account
    pub fn new(
        id: AccountId,
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        currency: Currency,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            account_type,
            currency,
            fraction: currency.smallest_fraction(),
            parent_id: None,
            children: Vec::new(),
            description: None,
        }
    }

    /// Sets the parent account
    pub fn with_parent(mut self, parent_id: AccountId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.account_type == AccountType::Root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_follows_currency() {
        let eur = Account::new(AccountId::new_v7(), "1200", "Receivables", AccountType::Receivable, Currency::EUR);
        let jpy = Account::new(AccountId::new_v7(), "1000", "Cash", AccountType::Cash, Currency::JPY);

        assert_eq!(eur.fraction, 100);
        assert_eq!(jpy.fraction, 1);
    }

    #[test]
    fn test_ar_ap_types() {
        assert!(AccountType::Receivable.is_ar_ap());
        assert!(AccountType::Payable.is_ar_ap());
        assert!(!AccountType::Income.is_ar_ap());
        assert!(AccountType::Receivable.is_debit_normal());
        assert!(!AccountType::Income.is_debit_normal());
    }
}
