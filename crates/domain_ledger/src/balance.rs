//! Memoized account balances
//!
//! A balance is the sum of the quantities of an account's splits dated up to
//! a given day. [`BalanceCache`] memoizes that sum per account, but only when
//! no split of the account lies in the future: a future-dated split would
//! silently start counting once the clock passes its date.
//!
//! A cached account subscribes to every change that could alter its sum (its
//! currency, its split set, and the account, quantity and date of each of its
//! splits). The first delivery for any of those topics drops the entry and
//! all of its subscriptions; recomputation waits for the next read.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use core_kernel::{AccountId, Money, SplitId};

use crate::error::LedgerResult;
use crate::events::{ChangeBus, ChangeEvent, ChangeField, EntityRef, Subscriber};
use crate::store::EntityStore;

/// Balance of one account as seen on a given day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountBalance {
    pub account_id: AccountId,
    /// Sum of split quantities dated on or before the day, in the account
    /// currency
    pub balance: Money,
    /// Sum of the quantities dated after the day
    pub future: Money,
    pub future_splits: usize,
    pub from_cache: bool,
}

impl AccountBalance {
    pub fn has_future_splits(&self) -> bool {
        self.future_splits > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// A memoized balance and the earliest day it holds for
#[derive(Debug, Clone, Copy)]
struct CachedBalance {
    balance: Money,
    as_of: NaiveDate,
}

#[derive(Debug, Default)]
pub struct BalanceCache {
    entries: HashMap<AccountId, CachedBalance>,
    stats: CacheStats,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance of `account` as of `today`
    ///
    /// Served from the cache when possible; otherwise computed and, if the
    /// account has no future-dated splits, memoized.
    ///
    /// A cached value holds for its own day and every later one. Asking for
    /// an earlier day recomputes.
    ///
    /// # Errors
    ///
    /// `AccountNotFound` for an unknown account.
    pub fn get(
        &mut self,
        store: &mut EntityStore,
        account: AccountId,
        today: NaiveDate,
    ) -> LedgerResult<AccountBalance> {
        if let Some(cached) = self.entries.get(&account) {
            if cached.as_of <= today {
                self.stats.hits += 1;
                return Ok(AccountBalance {
                    account_id: account,
                    balance: cached.balance,
                    future: Money::zero(cached.balance.currency()),
                    future_splits: 0,
                    from_cache: true,
                });
            }
        }

        self.stats.misses += 1;
        let (balance, splits) = tally(store, account, today)?;
        if !balance.has_future_splits() {
            let cached = CachedBalance {
                balance: balance.balance,
                as_of: today,
            };
            self.remember(store.bus_mut(), account, cached, &splits);
        }
        Ok(balance)
    }

    fn remember(&mut self, bus: &mut ChangeBus, account: AccountId, balance: CachedBalance, splits: &[SplitId]) {
        let subscriber = Subscriber::AccountBalance(account);
        bus.subscribe(subscriber, ChangeEvent::new(EntityRef::Account(account), ChangeField::Currency));
        bus.subscribe(subscriber, ChangeEvent::new(EntityRef::Account(account), ChangeField::Splits));
        for split in splits {
            for field in [ChangeField::Account, ChangeField::Quantity, ChangeField::Date] {
                bus.subscribe(subscriber, ChangeEvent::new(EntityRef::Split(*split), field));
            }
        }
        self.entries.insert(account, balance);
    }

    /// Drops the memoized balance of `account` and its subscriptions
    pub fn invalidate(&mut self, bus: &mut ChangeBus, account: AccountId) {
        bus.unsubscribe_all(Subscriber::AccountBalance(account));
        if self.entries.remove(&account).is_some() {
            self.stats.invalidations += 1;
            debug!(account = %account, "Invalidated cached balance");
        }
    }

    pub fn is_cached(&self, account: AccountId) -> bool {
        self.entries.contains_key(&account)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self, bus: &mut ChangeBus) {
        let accounts: Vec<AccountId> = self.entries.keys().copied().collect();
        for account in accounts {
            self.invalidate(bus, account);
        }
    }
}

/// Computes a balance without touching any cache
pub fn balance_as_of(store: &EntityStore, account: AccountId, date: NaiveDate) -> LedgerResult<AccountBalance> {
    tally(store, account, date).map(|(balance, _)| balance)
}

fn tally(
    store: &EntityStore,
    account: AccountId,
    as_of: NaiveDate,
) -> LedgerResult<(AccountBalance, Vec<SplitId>)> {
    let currency = store.account(account)?.currency;
    let mut balance = Money::zero(currency);
    let mut future = Money::zero(currency);
    let mut future_splits = 0;

    let split_ids = store.splits_of_account(account).to_vec();
    for split_id in &split_ids {
        let split = store.split(*split_id)?;
        let date = store.transaction(split.transaction_id)?.date_posted;
        if date > as_of {
            future = future.checked_add(&split.quantity)?;
            future_splits += 1;
        } else {
            balance = balance.checked_add(&split.quantity)?;
        }
    }

    Ok((
        AccountBalance {
            account_id: account,
            balance,
            future,
            future_splits,
            from_cache: false,
        },
        split_ids,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountType};
    use crate::transaction::SplitDraft;
    use core_kernel::{Currency, SequentialIdSource};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: EntityStore,
        cash: AccountId,
        income: AccountId,
    }

    fn fixture() -> Fixture {
        let mut store = EntityStore::new(Currency::EUR, Box::new(SequentialIdSource::new()));
        let cash = store.next_id();
        store
            .insert_account(Account::new(cash, "1000", "Cash", AccountType::Cash, Currency::EUR))
            .unwrap();
        let income = store.next_id();
        store
            .insert_account(Account::new(income, "4000", "Sales", AccountType::Income, Currency::EUR))
            .unwrap();
        Fixture { store, cash, income }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn book(f: &mut Fixture, date: NaiveDate, amount: rust_decimal::Decimal) {
        let tx = f.store.create_transaction(Currency::EUR, "Sale", date);
        f.store
            .create_split_pair(
                tx,
                SplitDraft::new(f.cash),
                SplitDraft::new(f.income),
                Money::new(amount, Currency::EUR),
            )
            .unwrap();
    }

    fn deliver(cache: &mut BalanceCache, store: &mut EntityStore) {
        for delivery in store.bus_mut().drain() {
            if let Subscriber::AccountBalance(account) = delivery.subscriber {
                cache.invalidate(store.bus_mut(), account);
            }
        }
    }

    #[test]
    fn test_second_read_hits_cache() {
        let mut f = fixture();
        book(&mut f, day(1), dec!(100));
        let mut cache = BalanceCache::new();

        let first = cache.get(&mut f.store, f.cash, day(10)).unwrap();
        let second = cache.get(&mut f.store, f.cash, day(10)).unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.balance.amount(), dec!(100));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_future_splits_are_reported_but_not_cached() {
        let mut f = fixture();
        book(&mut f, day(1), dec!(100));
        book(&mut f, day(20), dec!(50));
        let mut cache = BalanceCache::new();

        let balance = cache.get(&mut f.store, f.cash, day(10)).unwrap();

        assert_eq!(balance.balance.amount(), dec!(100));
        assert_eq!(balance.future.amount(), dec!(50));
        assert!(balance.has_future_splits());
        assert!(!cache.is_cached(f.cash));
    }

    #[test]
    fn test_new_split_invalidates() {
        let mut f = fixture();
        book(&mut f, day(1), dec!(100));
        let mut cache = BalanceCache::new();
        cache.get(&mut f.store, f.cash, day(10)).unwrap();

        book(&mut f, day(2), dec!(25));
        deliver(&mut cache, &mut f.store);

        assert!(!cache.is_cached(f.cash));
        assert_eq!(f.store.bus().topics_of(Subscriber::AccountBalance(f.cash)), 0);
        let balance = cache.get(&mut f.store, f.cash, day(10)).unwrap();
        assert_eq!(balance.balance.amount(), dec!(125));
    }

    #[test]
    fn test_redating_split_into_future_invalidates() {
        let mut f = fixture();
        book(&mut f, day(1), dec!(100));
        let mut cache = BalanceCache::new();
        cache.get(&mut f.store, f.income, day(10)).unwrap();

        let split = f.store.splits_of_account(f.income)[0];
        let tx = f.store.split(split).unwrap().transaction_id;
        f.store.set_transaction_date(tx, day(30)).unwrap();
        deliver(&mut cache, &mut f.store);

        let balance = cache.get(&mut f.store, f.income, day(10)).unwrap();
        assert!(balance.balance.is_zero());
        assert_eq!(balance.future.amount(), dec!(-100));
    }

    #[test]
    fn test_earlier_day_misses_cache() {
        let mut f = fixture();
        book(&mut f, day(1), dec!(10));
        book(&mut f, day(5), dec!(20));
        let mut cache = BalanceCache::new();

        let cached = cache.get(&mut f.store, f.cash, day(10)).unwrap();
        assert_eq!(cached.balance.amount(), dec!(30));
        assert!(cache.is_cached(f.cash));

        let earlier = cache.get(&mut f.store, f.cash, day(3)).unwrap();
        assert!(!earlier.from_cache);
        assert_eq!(earlier.balance.amount(), dec!(10));
        assert_eq!(earlier.future.amount(), dec!(20));

        let later = cache.get(&mut f.store, f.cash, day(12)).unwrap();
        assert!(later.from_cache);
        assert_eq!(later.balance.amount(), dec!(30));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_balance_as_of_ignores_cache() {
        let mut f = fixture();
        book(&mut f, day(1), dec!(10));
        book(&mut f, day(5), dec!(20));

        assert_eq!(balance_as_of(&f.store, f.cash, day(3)).unwrap().balance.amount(), dec!(10));
        assert_eq!(balance_as_of(&f.store, f.cash, day(5)).unwrap().balance.amount(), dec!(30));
    }
}
