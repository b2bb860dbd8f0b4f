//! Custom Test Assertions
//!
//! Provides assertion helpers for ledger invariants that give more
//! meaningful failure messages than plain `assert_eq!`.

use core_kernel::{AccountId, Money, TransactionId};
use domain_ledger::EntityStore;
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than
/// `tolerance`
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money);
}

/// Asserts that the split values of `transaction` sum to zero
pub fn assert_transaction_balanced(store: &EntityStore, transaction: TransactionId) {
    let imbalance = store
        .imbalance(transaction)
        .unwrap_or_else(|e| panic!("Cannot sum transaction {}: {}", transaction, e));
    assert!(
        imbalance.is_zero(),
        "Transaction {} is unbalanced by {}",
        transaction,
        imbalance
    );
}

/// Asserts the balance invariant for every transaction in the store
pub fn assert_all_transactions_balanced(store: &EntityStore) {
    for transaction in store.transactions() {
        assert_transaction_balanced(store, transaction.id);
    }
}

/// Sum of the values `transaction` books against `account`
pub fn split_value_on(store: &EntityStore, transaction: TransactionId, account: AccountId) -> Option<Decimal> {
    let splits: Vec<_> = store
        .splits_of_transaction(transaction)
        .unwrap_or_else(|e| panic!("Cannot read transaction {}: {}", transaction, e))
        .into_iter()
        .filter(|s| s.account_id == account)
        .collect();
    if splits.is_empty() {
        return None;
    }
    Some(splits.iter().map(|s| s.value.amount()).sum())
}

/// Asserts that `transaction` books exactly `expected` against `account`
pub fn assert_split_value(store: &EntityStore, transaction: TransactionId, account: AccountId, expected: Decimal) {
    let actual = split_value_on(store, transaction, account);
    assert_eq!(
        actual,
        Some(expected),
        "Unexpected value on account {} in transaction {}",
        account,
        transaction
    );
}

/// Asserts that `transaction` has no split on `account`
pub fn assert_no_split_on(store: &EntityStore, transaction: TransactionId, account: AccountId) {
    let actual = split_value_on(store, transaction, account);
    assert!(
        actual.is_none(),
        "Transaction {} still books {:?} against account {}",
        transaction,
        actual,
        account
    );
}
