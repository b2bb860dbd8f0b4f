//! Ledger facade
//!
//! [`Ledger`] owns the entity store, the balance cache, the clock and the
//! persistence gateway, and is the one entry point hosts use. After every
//! successful mutation it bumps the graph version, reports it to the
//! gateway, and dispatches pending change notifications: balance cache
//! entries are invalidated, observer deliveries are queued for
//! [`Ledger::drain_notifications`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::info;

use core_kernel::{
    AccountId, Clock, Currency, DocumentId, EntryId, IdSource, JobId, Money, SplitId, SystemClock,
    TaxTableId, TransactionId, UuidV7Source,
};

use crate::account::{Account, AccountType};
use crate::balance::{self, AccountBalance, BalanceCache};
use crate::config::LedgerConfig;
use crate::document::{DocumentTotals, EntryDraft, EntrySide, Job, JobOwner, Owner};
use crate::error::LedgerResult;
use crate::events::{ChangeEvent, Subscriber};
use crate::mutation::{self, EntryChange};
use crate::ports::{InMemoryGateway, PersistenceGateway};
use crate::posting::{self, NewDocument, PaymentRequest, PostRequest};
use crate::store::EntityStore;
use crate::tax::{TaxTable, TaxTableEntry};
use crate::transaction::SplitDraft;

/// The ledger and everything needed to keep it consistent
///
/// # Invariants
///
/// - Every transaction balances after every public call
/// - A failed call leaves the entity graph unchanged
/// - Cached balances never outlive a change to the splits they sum
#[derive(Debug)]
pub struct Ledger {
    store: EntityStore,
    balances: BalanceCache,
    clock: Box<dyn Clock>,
    gateway: Box<dyn PersistenceGateway>,
    config: LedgerConfig,
    notifications: Vec<ChangeEvent>,
}

/// Builder for [`Ledger`]
#[derive(Debug, Default)]
pub struct LedgerBuilder {
    config: LedgerConfig,
    clock: Option<Box<dyn Clock>>,
    ids: Option<Box<dyn IdSource>>,
    gateway: Option<Box<dyn PersistenceGateway>>,
}

impl LedgerBuilder {
    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn with_id_source(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    pub fn with_gateway(mut self, gateway: Box<dyn PersistenceGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    fn parts(self) -> (LedgerConfig, Box<dyn Clock>, Box<dyn IdSource>, Box<dyn PersistenceGateway>) {
        let clock = self
            .clock
            .unwrap_or_else(|| Box::new(SystemClock::new(self.config.timezone)));
        let ids = self.ids.unwrap_or_else(|| Box::new(UuidV7Source));
        let gateway = self
            .gateway
            .unwrap_or_else(|| Box::new(InMemoryGateway::new()));
        (self.config, clock, ids, gateway)
    }

    /// Creates an empty ledger holding only a root account
    pub fn build(self) -> Ledger {
        let (config, clock, ids, gateway) = self.parts();
        let store = EntityStore::new(config.default_currency, ids);
        Ledger::assemble(store, clock, gateway, config)
    }

    /// Restores the ledger last saved through the gateway
    ///
    /// # Errors
    ///
    /// `Persistence` if the gateway has nothing to load or cannot decode it;
    /// `InvalidArgument`/`UnbalancedTransaction` if the graph is corrupt.
    pub fn open(self) -> LedgerResult<Ledger> {
        let (config, clock, ids, gateway) = self.parts();
        let graph = gateway.load()?;
        let store = EntityStore::from_graph(graph, ids)?;
        info!(
            version = store.version(),
            accounts = store.accounts().count(),
            transactions = store.transactions().count(),
            "Opened ledger"
        );
        Ok(Ledger::assemble(store, clock, gateway, config))
    }
}

impl Ledger {
    /// Creates an empty ledger with the system clock and an in-memory
    /// gateway
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let ledger = Ledger::new(LedgerConfig::load()?);
    /// ```
    pub fn new(config: LedgerConfig) -> Self {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::default()
    }

    fn assemble(
        store: EntityStore,
        clock: Box<dyn Clock>,
        gateway: Box<dyn PersistenceGateway>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            balances: BalanceCache::new(),
            clock,
            gateway,
            config,
            notifications: Vec::new(),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &dyn PersistenceGateway {
        self.gateway.as_ref()
    }

    /// Gives the gateway back, e.g. to reopen what was saved
    pub fn into_gateway(self) -> Box<dyn PersistenceGateway> {
        self.gateway
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn balance_cache(&self) -> &BalanceCache {
        &self.balances
    }

    /// Finishes a public operation
    fn commit<T>(&mut self, result: LedgerResult<T>) -> LedgerResult<T> {
        if result.is_ok() {
            let version = self.store.bump_version();
            self.gateway.mark_dirty(version);
        }
        self.dispatch();
        result
    }

    /// Delivers queued change notifications
    fn dispatch(&mut self) {
        while self.store.bus().has_pending() {
            for delivery in self.store.bus_mut().drain() {
                match delivery.subscriber {
                    Subscriber::AccountBalance(account) => {
                        self.balances.invalidate(self.store.bus_mut(), account);
                    }
                    Subscriber::Observer(_) => self.notifications.push(delivery.event),
                }
            }
        }
    }

    // ==================================================================
    // Accounts
    // ==================================================================

    /// Adds an account
    ///
    /// # Arguments
    ///
    /// * `code` - Account code, e.g. "1200"
    /// * `name` - Display name
    /// * `account_type` - Type of account
    /// * `currency` - Commodity the account is kept in
    /// * `parent` - Parent account; the root when `None`
    pub fn create_account(
        &mut self,
        code: &str,
        name: &str,
        account_type: AccountType,
        currency: Currency,
        parent: Option<AccountId>,
    ) -> LedgerResult<AccountId> {
        let id = self.store.next_id();
        let mut account = Account::new(id, code, name, account_type, currency);
        account.parent_id = parent;
        self.add_account(account)
    }

    pub fn add_account(&mut self, account: Account) -> LedgerResult<AccountId> {
        let result = self.store.insert_account(account);
        self.commit(result)
    }

    pub fn set_account_parent(&mut self, account: AccountId, parent: AccountId) -> LedgerResult<()> {
        let result = self.store.set_account_parent(account, parent);
        self.commit(result)
    }

    pub fn set_account_currency(&mut self, account: AccountId, currency: Currency) -> LedgerResult<()> {
        let result = self.store.set_account_currency(account, currency);
        self.commit(result)
    }

    pub fn set_account_fraction(&mut self, account: AccountId, fraction: i64) -> LedgerResult<()> {
        let result = self.store.set_account_fraction(account, fraction);
        self.commit(result)
    }

    pub fn remove_account(&mut self, account: AccountId) -> LedgerResult<()> {
        let result = self.store.remove_account(account);
        self.commit(result)
    }

    // ==================================================================
    // Transactions
    // ==================================================================

    pub fn create_transaction(
        &mut self,
        currency: Currency,
        description: &str,
        date: NaiveDate,
    ) -> LedgerResult<TransactionId> {
        let id = self.store.create_transaction(currency, description, date);
        self.commit(Ok(id))
    }

    /// Books `value` from `credit` to `debit` in one transaction
    pub fn create_split_pair(
        &mut self,
        transaction: TransactionId,
        debit: SplitDraft,
        credit: SplitDraft,
        value: Money,
    ) -> LedgerResult<(SplitId, SplitId)> {
        let result = self.store.create_split_pair(transaction, debit, credit, value);
        self.commit(result)
    }

    pub fn update_split_pair(&mut self, to: SplitId, from: SplitId, delta: Money) -> LedgerResult<()> {
        let result = self.store.update_split_pair(to, from, delta);
        self.commit(result)
    }

    pub fn remove_split(&mut self, split: SplitId) -> LedgerResult<()> {
        let result = self.store.remove_split(split);
        self.commit(result)
    }

    pub fn move_split_to_account(&mut self, split: SplitId, account: AccountId) -> LedgerResult<()> {
        let result = self.store.move_split_to_account(split, account);
        self.commit(result)
    }

    pub fn set_transaction_date(&mut self, transaction: TransactionId, date: NaiveDate) -> LedgerResult<()> {
        let result = self.store.set_transaction_date(transaction, date);
        self.commit(result)
    }

    pub fn remove_transaction(&mut self, transaction: TransactionId) -> LedgerResult<()> {
        let result = self.store.remove_transaction(transaction);
        self.commit(result)
    }

    // ==================================================================
    // Tax tables and jobs
    // ==================================================================

    pub fn add_tax_table(&mut self, name: &str, entries: Vec<TaxTableEntry>) -> LedgerResult<TaxTableId> {
        let id = self.store.next_id();
        let result = self.store.insert_tax_table(TaxTable::new(id, name, entries));
        self.commit(result)
    }

    pub fn remove_tax_table(&mut self, table: TaxTableId) -> LedgerResult<()> {
        let result = self.store.remove_tax_table(table);
        self.commit(result)
    }

    pub fn add_job(&mut self, number: &str, name: &str, owner: JobOwner) -> LedgerResult<JobId> {
        let id = self.store.next_id();
        let result = self.store.insert_job(Job::new(id, number, name, owner));
        self.commit(result)
    }

    // ==================================================================
    // Documents
    // ==================================================================

    pub fn open_document(&mut self, document: NewDocument) -> LedgerResult<DocumentId> {
        let result = posting::open_document(&mut self.store, document);
        self.commit(result)
    }

    pub fn set_owner(&mut self, document: DocumentId, owner: Owner) -> LedgerResult<()> {
        let result = posting::set_owner(&mut self.store, document, owner);
        self.commit(result)
    }

    /// Posts a document; see [`posting::post_document`]
    pub fn post(&mut self, document: DocumentId, request: &PostRequest) -> LedgerResult<TransactionId> {
        let fallback = self.config.tax_fallback();
        let result = posting::post_document(&mut self.store, document, request, fallback);
        self.commit(result)
    }

    pub fn pay(&mut self, document: DocumentId, request: &PaymentRequest) -> LedgerResult<TransactionId> {
        let result = posting::pay_document(&mut self.store, document, request);
        self.commit(result)
    }

    pub fn remove_document(&mut self, document: DocumentId) -> LedgerResult<()> {
        let result = posting::remove_document(&mut self.store, document);
        self.commit(result)
    }

    pub fn is_modifiable(&self, document: DocumentId) -> LedgerResult<bool> {
        posting::is_modifiable(&self.store, document)
    }

    pub fn amount_due(&self, document: DocumentId) -> LedgerResult<Money> {
        posting::amount_due(&self.store, document)
    }

    pub fn is_paid(&self, document: DocumentId) -> LedgerResult<bool> {
        posting::is_paid(&self.store, document)
    }

    pub fn document_totals(&self, document: DocumentId) -> LedgerResult<DocumentTotals> {
        posting::document_totals(&self.store, document, self.config.tax_fallback())
    }

    // ==================================================================
    // Entries
    // ==================================================================

    pub fn create_entry(
        &mut self,
        document: DocumentId,
        side: EntrySide,
        draft: EntryDraft,
    ) -> LedgerResult<EntryId> {
        let fallback = self.config.tax_fallback();
        let result = mutation::create_entry(&mut self.store, document, side, draft, fallback);
        self.commit(result)
    }

    fn change_entry(&mut self, entry: EntryId, side: EntrySide, change: EntryChange) -> LedgerResult<()> {
        let fallback = self.config.tax_fallback();
        let result = mutation::change_entry(&mut self.store, entry, side, change, fallback);
        self.commit(result)
    }

    pub fn set_taxable(&mut self, entry: EntryId, side: EntrySide, taxable: bool) -> LedgerResult<()> {
        self.change_entry(entry, side, EntryChange::Taxable(taxable))
    }

    pub fn set_tax_table(
        &mut self,
        entry: EntryId,
        side: EntrySide,
        table: Option<TaxTableId>,
    ) -> LedgerResult<()> {
        self.change_entry(entry, side, EntryChange::TaxTable(table))
    }

    pub fn set_price(&mut self, entry: EntryId, side: EntrySide, price: Money) -> LedgerResult<()> {
        self.change_entry(entry, side, EntryChange::Price(price))
    }

    pub fn set_quantity(&mut self, entry: EntryId, quantity: Decimal) -> LedgerResult<()> {
        let side = self.store.entry(entry)?.side;
        self.change_entry(entry, side, EntryChange::Quantity(quantity))
    }

    pub fn set_entry_account(
        &mut self,
        entry: EntryId,
        side: EntrySide,
        account: Option<AccountId>,
    ) -> LedgerResult<()> {
        self.change_entry(entry, side, EntryChange::Account(account))
    }

    pub fn set_entry_description(&mut self, entry: EntryId, description: &str) -> LedgerResult<()> {
        let side = self.store.entry(entry)?.side;
        self.change_entry(entry, side, EntryChange::Description(description.to_string()))
    }

    pub fn remove_entry(&mut self, entry: EntryId) -> LedgerResult<()> {
        let fallback = self.config.tax_fallback();
        let result = mutation::remove_entry(&mut self.store, entry, fallback);
        self.commit(result)
    }

    // ==================================================================
    // Balances
    // ==================================================================

    /// Balance of `account` up to today, memoized when possible
    pub fn get_balance(&mut self, account: AccountId) -> LedgerResult<AccountBalance> {
        self.dispatch();
        let today = self.clock.today();
        self.balances.get(&mut self.store, account, today)
    }

    /// Balance of `account` up to `date`, always recomputed
    pub fn balance_as_of(&self, account: AccountId, date: NaiveDate) -> LedgerResult<AccountBalance> {
        balance::balance_as_of(&self.store, account, date)
    }

    /// Generates a trial balance report
    ///
    /// Accounts with a positive balance are listed as debits, negative ones
    /// as credits. Totals are kept per account currency.
    pub fn trial_balance(&self, as_of: NaiveDate) -> LedgerResult<TrialBalance> {
        let mut entries = Vec::new();
        let mut totals: BTreeMap<Currency, (Money, Money)> = BTreeMap::new();

        for account in self.store.accounts() {
            let balance = balance::balance_as_of(&self.store, account.id, as_of)?.balance;
            if balance.is_zero() {
                continue;
            }
            let zero = Money::zero(account.currency);
            let (debit, credit) = if balance.is_negative() {
                (zero, balance.abs())
            } else {
                (balance, zero)
            };

            let (total_debits, total_credits) = totals.entry(account.currency).or_insert((zero, zero));
            *total_debits = total_debits.checked_add(&debit)?;
            *total_credits = total_credits.checked_add(&credit)?;

            entries.push(TrialBalanceEntry {
                account_id: account.id,
                account_code: account.code.clone(),
                account_name: account.name.clone(),
                account_type: account.account_type,
                debit,
                credit,
            });
        }
        entries.sort_by(|a, b| (&a.account_code, &a.account_name).cmp(&(&b.account_code, &b.account_name)));

        let totals: Vec<CurrencyTotals> = totals
            .into_iter()
            .map(|(currency, (total_debits, total_credits))| CurrencyTotals {
                currency,
                total_debits,
                total_credits,
            })
            .collect();
        let is_balanced = totals.iter().all(|t| t.total_debits == t.total_credits);

        Ok(TrialBalance {
            as_of,
            entries,
            totals,
            is_balanced,
        })
    }

    // ==================================================================
    // Notifications
    // ==================================================================

    /// Registers an observer of `topic`
    pub fn subscribe(&mut self, topic: ChangeEvent) -> Subscriber {
        let observer = self.store.bus_mut().register_observer();
        self.store.bus_mut().subscribe(observer, topic);
        observer
    }

    /// Adds another topic to an existing observer
    pub fn subscribe_to(&mut self, observer: Subscriber, topic: ChangeEvent) {
        self.store.bus_mut().subscribe(observer, topic);
    }

    pub fn unsubscribe(&mut self, observer: Subscriber) {
        self.store.bus_mut().unsubscribe_all(observer);
    }

    /// Events delivered to observers since the last call
    pub fn drain_notifications(&mut self) -> Vec<ChangeEvent> {
        self.dispatch();
        std::mem::take(&mut self.notifications)
    }

    // ==================================================================
    // Persistence
    // ==================================================================

    /// Hands the current graph to the gateway
    pub fn save(&mut self) -> LedgerResult<()> {
        let graph = self.store.snapshot();
        self.gateway.save(&graph)?;
        let touched = self.store.take_dirty();
        info!(version = graph.version, touched = touched.len(), "Saved ledger");
        Ok(())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.store.is_dirty()
    }
}

/// Trial balance report
#[derive(Debug, Clone, PartialEq)]
pub struct TrialBalance {
    pub as_of: NaiveDate,
    /// Accounts with a non-zero balance, ordered by code and name
    pub entries: Vec<TrialBalanceEntry>,
    pub totals: Vec<CurrencyTotals>,
    /// Whether debits equal credits in every currency
    pub is_balanced: bool,
}

/// A single entry in the trial balance
#[derive(Debug, Clone, PartialEq)]
pub struct TrialBalanceEntry {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub debit: Money,
    pub credit: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyTotals {
    pub currency: Currency,
    pub total_debits: Money,
    pub total_credits: Money,
}
