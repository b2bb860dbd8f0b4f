//! Tax tables and per-entry tax computation
//!
//! A tax table is an ordered list of `(account, amount)` pairs where the
//! amount is either a percentage of the entry's net sum or a fixed value.
//! Only the first pair of a table takes part in the computation; tables with
//! more pairs are accepted but the extra pairs are ignored (and logged).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use core_kernel::{AccountId, Money, Rate, TaxTableId};

use crate::error::{LedgerError, LedgerResult};

/// How a tax table entry charges tax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxAmount {
    /// Percentage of the net sum, e.g. `19` for 19%
    Percent(Decimal),
    /// Fixed amount added once per entry
    Value(Decimal),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTableEntry {
    /// Account that receives the tax
    pub account_id: AccountId,
    pub amount: TaxAmount,
}

impl TaxTableEntry {
    pub fn percent(account_id: AccountId, percent: Decimal) -> Self {
        Self {
            account_id,
            amount: TaxAmount::Percent(percent),
        }
    }

    pub fn fixed(account_id: AccountId, value: Decimal) -> Self {
        Self {
            account_id,
            amount: TaxAmount::Value(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTable {
    pub id: TaxTableId,
    pub name: String,
    pub entries: Vec<TaxTableEntry>,
}

impl TaxTable {
    pub fn new(id: TaxTableId, name: impl Into<String>, entries: Vec<TaxTableEntry>) -> Self {
        Self {
            id,
            name: name.into(),
            entries,
        }
    }

    /// The entry used for computation
    pub fn effective_entry(&self) -> Option<&TaxTableEntry> {
        if self.entries.len() > 1 {
            warn!(
                tax_table = %self.name,
                ignored = self.entries.len() - 1,
                "Tax table has several entries; only the first is applied"
            );
        }
        self.entries.first()
    }
}

/// Lookup of tax tables for entries that do not name one
pub trait TaxTableRepository {
    fn find_by_name(&self, name: &str) -> Option<&TaxTable>;

    /// Table used when a taxable entry has no table of its own
    fn first_available(&self) -> Option<&TaxTable>;
}

/// Table used by a taxable entry that does not name one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaxFallback {
    /// The repository's first available table
    #[default]
    FirstAvailable,
    /// No fallback; such entries fail with `TaxTableNotFound`
    Disabled,
}

impl TaxFallback {
    pub fn resolve<'a, R>(&self, repository: &'a R) -> Option<&'a TaxTable>
    where
        R: TaxTableRepository + ?Sized,
    {
        match self {
            TaxFallback::FirstAvailable => repository.first_available(),
            TaxFallback::Disabled => None,
        }
    }
}

/// Net, gross and tax target of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxComputation {
    pub sum_excl_tax: Money,
    pub sum_incl_tax: Money,
    /// Account receiving `sum_incl_tax - sum_excl_tax`; `None` when untaxed
    pub tax_account: Option<AccountId>,
}

impl TaxComputation {
    pub fn tax(&self) -> Money {
        self.sum_incl_tax - self.sum_excl_tax
    }

    /// Same computation with every amount negated
    pub fn negated(&self) -> Self {
        Self {
            sum_excl_tax: -self.sum_excl_tax,
            sum_incl_tax: -self.sum_incl_tax,
            tax_account: self.tax_account,
        }
    }
}

/// Computes the sums for one entry
///
/// # Arguments
///
/// * `quantity` - Entry quantity
/// * `price` - Unit price
/// * `taxable` - Whether tax applies at all
/// * `table` - Resolved tax table, required when `taxable`
///
/// # Errors
///
/// `TaxTableNotFound` when the entry is taxable but no table (or no table
/// entry) is available; `Money(Overflow)` when a sum does not fit.
pub fn compute(
    quantity: Decimal,
    price: Money,
    taxable: bool,
    table: Option<&TaxTable>,
) -> LedgerResult<TaxComputation> {
    let sum_excl_tax = price.checked_multiply(quantity)?;

    if !taxable {
        return Ok(TaxComputation {
            sum_excl_tax,
            sum_incl_tax: sum_excl_tax,
            tax_account: None,
        });
    }

    let table = table.ok_or_else(|| {
        LedgerError::TaxTableNotFound("taxable entry has no tax table".to_string())
    })?;
    let entry = table.effective_entry().ok_or_else(|| {
        LedgerError::TaxTableNotFound(format!("tax table '{}' has no entries", table.name))
    })?;

    let tax = match entry.amount {
        TaxAmount::Percent(percent) => Rate::from_percentage(percent).checked_apply(&sum_excl_tax)?,
        TaxAmount::Value(value) => Money::new(value, price.currency()),
    };

    Ok(TaxComputation {
        sum_excl_tax,
        sum_incl_tax: sum_excl_tax.checked_add(&tax)?,
        tax_account: Some(entry.account_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, MoneyError};
    use rust_decimal_macros::dec;

    fn vat(percent: Decimal) -> (AccountId, TaxTable) {
        let account = AccountId::new_v7();
        let table = TaxTable::new(
            TaxTableId::new_v7(),
            "VAT",
            vec![TaxTableEntry::percent(account, percent)],
        );
        (account, table)
    }

    #[test]
    fn test_percentage_tax() {
        let (account, table) = vat(dec!(19));
        let price = Money::new(dec!(12.50), Currency::EUR);

        let sums = compute(dec!(3), price, true, Some(&table)).unwrap();

        assert_eq!(sums.sum_excl_tax.amount(), dec!(37.50));
        assert_eq!(sums.sum_incl_tax.amount(), dec!(44.625));
        assert_eq!(sums.tax().amount(), dec!(7.125));
        assert_eq!(sums.tax_account, Some(account));
    }

    #[test]
    fn test_untaxed_entry_ignores_table() {
        let (_, table) = vat(dec!(19));
        let price = Money::new(dec!(12.50), Currency::EUR);

        let sums = compute(dec!(3), price, false, Some(&table)).unwrap();

        assert_eq!(sums.sum_incl_tax, sums.sum_excl_tax);
        assert!(sums.tax_account.is_none());
    }

    #[test]
    fn test_fixed_amount_tax() {
        let account = AccountId::new_v7();
        let table = TaxTable::new(TaxTableId::new_v7(), "Levy", vec![TaxTableEntry::fixed(account, dec!(2.5))]);
        let price = Money::new(dec!(10), Currency::EUR);

        let sums = compute(dec!(4), price, true, Some(&table)).unwrap();

        assert_eq!(sums.sum_incl_tax.amount(), dec!(42.5));
    }

    #[test]
    fn test_only_first_entry_is_applied() {
        let first = AccountId::new_v7();
        let second = AccountId::new_v7();
        let table = TaxTable::new(
            TaxTableId::new_v7(),
            "Stacked",
            vec![
                TaxTableEntry::percent(first, dec!(10)),
                TaxTableEntry::percent(second, dec!(5)),
            ],
        );
        let price = Money::new(dec!(100), Currency::EUR);

        let sums = compute(Decimal::ONE, price, true, Some(&table)).unwrap();

        assert_eq!(sums.tax().amount(), dec!(10));
        assert_eq!(sums.tax_account, Some(first));
    }

    #[test]
    fn test_taxable_without_table_fails() {
        let price = Money::new(dec!(1), Currency::EUR);
        let result = compute(Decimal::ONE, price, true, None);
        assert!(matches!(result, Err(LedgerError::TaxTableNotFound(_))));
    }

    #[test]
    fn test_overflowing_sum_is_an_error() {
        let (_, table) = vat(dec!(19));
        let price = Money::new(dec!(10), Currency::EUR);

        let untaxed = compute(Decimal::MAX, price, false, None);
        assert!(matches!(untaxed, Err(LedgerError::Money(MoneyError::Overflow))));

        let near_max = Money::new(Decimal::MAX, Currency::EUR);
        let taxed = compute(Decimal::ONE, near_max, true, Some(&table));
        assert!(matches!(taxed, Err(LedgerError::Money(MoneyError::Overflow))));
    }

    #[test]
    fn test_negated_cancels() {
        let (_, table) = vat(dec!(19));
        let sums = compute(dec!(2), Money::new(dec!(9.99), Currency::EUR), true, Some(&table)).unwrap();
        let back = sums.negated();
        assert!((sums.sum_incl_tax + back.sum_incl_tax).is_zero());
        assert_eq!(back.tax_account, sums.tax_account);
    }
}
