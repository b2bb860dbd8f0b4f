//! Property-Based Test Generators
//!
//! Provides proptest strategies for entry terms and ledger edits.

use core_kernel::{Currency, Money};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for entry quantities (0.01 to 1000.00)
pub fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Strategy for EUR unit prices in cents (0.01 to 10000.00)
pub fn price_strategy() -> impl Strategy<Value = Money> {
    (1i64..1_000_000i64).prop_map(|cents| Money::from_minor(cents, Currency::EUR))
}

/// Strategy for tax percentages (0% to 30%)
pub fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..3000u32).prop_map(|n| Decimal::new(n as i64, 2))
}

/// Quantity, unit price and taxable flag of one entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryTermsSample {
    pub quantity: Decimal,
    pub price: Money,
    pub taxable: bool,
}

pub fn entry_terms_strategy() -> impl Strategy<Value = EntryTermsSample> {
    (quantity_strategy(), price_strategy(), any::<bool>()).prop_map(|(quantity, price, taxable)| {
        EntryTermsSample {
            quantity,
            price,
            taxable,
        }
    })
}

/// A single edit applied to an existing entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryEdit {
    Quantity(Decimal),
    Price(Money),
    Taxable(bool),
    /// Book against the expense account instead of the default
    Rebook,
    Remove,
}

pub fn entry_edit_strategy() -> impl Strategy<Value = EntryEdit> {
    prop_oneof![
        quantity_strategy().prop_map(EntryEdit::Quantity),
        price_strategy().prop_map(EntryEdit::Price),
        any::<bool>().prop_map(EntryEdit::Taxable),
        Just(EntryEdit::Rebook),
        Just(EntryEdit::Remove),
    ]
}
