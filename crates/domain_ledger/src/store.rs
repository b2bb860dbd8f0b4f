//! In-memory entity store
//!
//! The store is an arena of every ledger entity keyed by identifier. All
//! relationships are id-valued fields; the store keeps the reverse indices
//! (splits per account, splits per lot) that the posting engine and the
//! balance cache navigate by.
//!
//! # Invariants
//!
//! - Exactly one root account; every other account has exactly one parent
//!   and the parent chain never loops.
//! - The values of every transaction's splits sum to zero. Split amounts are
//!   only ever changed in balanced pairs (see [`EntityStore::create_split_pair`]
//!   and [`EntityStore::update_split_pair`]).
//! - Transactions that realize a document are owned by the posting engine
//!   and rejected by the public split operations.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

use core_kernel::{
    AccountId, Currency, DocumentId, EntryId, IdSource, JobId, LotId, Money, MoneyError, SplitId,
    TaxTableId, TransactionId,
};

use crate::account::{Account, AccountType};
use crate::document::{Document, Entry, Job};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{ChangeBus, ChangeEvent, ChangeField, EntityRef};
use crate::lot::Lot;
use crate::tax::{TaxTable, TaxTableRepository};
use crate::transaction::{Split, SplitDraft, SplitTarget, Transaction};

/// Serializable form of the whole entity graph
///
/// Collections are sorted by id so that equal graphs encode identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGraph {
    pub version: u64,
    pub root_account: AccountId,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub splits: Vec<Split>,
    pub lots: Vec<Lot>,
    pub documents: Vec<Document>,
    pub entries: Vec<Entry>,
    /// In lookup order; the first one is the fallback table
    pub tax_tables: Vec<TaxTable>,
    pub jobs: Vec<Job>,
}

#[derive(Debug)]
pub struct EntityStore {
    root: AccountId,
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
    splits: HashMap<SplitId, Split>,
    lots: HashMap<LotId, Lot>,
    documents: HashMap<DocumentId, Document>,
    entries: HashMap<EntryId, Entry>,
    tax_tables: HashMap<TaxTableId, TaxTable>,
    tax_table_order: Vec<TaxTableId>,
    jobs: HashMap<JobId, Job>,
    account_splits: HashMap<AccountId, Vec<SplitId>>,
    lot_splits: HashMap<LotId, Vec<SplitId>>,
    bus: ChangeBus,
    dirty: BTreeSet<EntityRef>,
    version: u64,
    ids: Box<dyn IdSource>,
}

impl EntityStore {
    /// Creates a store holding only a root account
    ///
    /// # Arguments
    ///
    /// * `currency` - Commodity of the root account
    /// * `ids` - Source of identifiers for every entity created later
    pub fn new(currency: Currency, mut ids: Box<dyn IdSource>) -> Self {
        let root = AccountId::from(ids.next_uuid());
        let mut accounts = HashMap::new();
        accounts.insert(
            root,
            Account::new(root, "", "Root Account", AccountType::Root, currency),
        );

        Self {
            root,
            accounts,
            transactions: HashMap::new(),
            splits: HashMap::new(),
            lots: HashMap::new(),
            documents: HashMap::new(),
            entries: HashMap::new(),
            tax_tables: HashMap::new(),
            tax_table_order: Vec::new(),
            jobs: HashMap::new(),
            account_splits: HashMap::new(),
            lot_splits: HashMap::new(),
            bus: ChangeBus::new(),
            dirty: BTreeSet::new(),
            version: 0,
            ids,
        }
    }

    pub(crate) fn next_id<T: From<Uuid>>(&mut self) -> T {
        T::from(self.ids.next_uuid())
    }

    // ------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------

    pub(crate) fn changed(&mut self, entity: EntityRef, field: ChangeField) {
        self.dirty.insert(entity);
        self.bus.publish(ChangeEvent::new(entity, field));
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub(crate) fn bus_mut(&mut self) -> &mut ChangeBus {
        &mut self.bus
    }

    /// Version of the graph; bumped once per successful public operation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Entities touched since the last call
    pub fn take_dirty(&mut self) -> BTreeSet<EntityRef> {
        std::mem::take(&mut self.dirty)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn root_account_id(&self) -> AccountId {
        self.root
    }

    pub fn account(&self, id: AccountId) -> LedgerResult<&Account> {
        self.accounts
            .get(&id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn transaction(&self, id: TransactionId) -> LedgerResult<&Transaction> {
        self.transactions
            .get(&id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn split(&self, id: SplitId) -> LedgerResult<&Split> {
        self.splits
            .get(&id)
            .ok_or_else(|| LedgerError::SplitNotFound(id.to_string()))
    }

    /// Splits of a transaction in creation order
    pub fn splits_of_transaction(&self, id: TransactionId) -> LedgerResult<Vec<&Split>> {
        self.transaction(id)?
            .splits
            .iter()
            .map(|split_id| self.split(*split_id))
            .collect()
    }

    pub fn splits_of_account(&self, id: AccountId) -> &[SplitId] {
        self.account_splits.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn splits_in_lot(&self, id: LotId) -> &[SplitId] {
        self.lot_splits.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn lot(&self, id: LotId) -> LedgerResult<&Lot> {
        self.lots
            .get(&id)
            .ok_or_else(|| LedgerError::LotNotFound(id.to_string()))
    }

    pub fn document(&self, id: DocumentId) -> LedgerResult<&Document> {
        self.documents
            .get(&id)
            .ok_or_else(|| LedgerError::DocumentNotFound(id.to_string()))
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn entry(&self, id: EntryId) -> LedgerResult<&Entry> {
        self.entries
            .get(&id)
            .ok_or_else(|| LedgerError::EntryNotFound(id.to_string()))
    }

    pub fn tax_table(&self, id: TaxTableId) -> LedgerResult<&TaxTable> {
        self.tax_tables
            .get(&id)
            .ok_or_else(|| LedgerError::TaxTableNotFound(id.to_string()))
    }

    pub fn job(&self, id: JobId) -> LedgerResult<&Job> {
        self.jobs
            .get(&id)
            .ok_or_else(|| LedgerError::JobNotFound(id.to_string()))
    }

    /// Sum of the split values of a transaction
    pub fn imbalance(&self, id: TransactionId) -> LedgerResult<Money> {
        let tx = self.transaction(id)?;
        let values: Vec<Money> = self
            .splits_of_transaction(id)?
            .into_iter()
            .map(|s| s.value)
            .collect();
        Ok(Money::sum(tx.currency, values.iter())?)
    }

    /// Fails with `UnbalancedTransaction` unless the values sum to zero
    pub fn check_balanced(&self, id: TransactionId) -> LedgerResult<()> {
        let imbalance = self.imbalance(id)?;
        if !imbalance.is_zero() {
            return Err(LedgerError::UnbalancedTransaction {
                transaction: id.to_string(),
                imbalance: imbalance.amount(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Adds an account to the tree
    ///
    /// Accounts without a parent are attached below the root.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a second root, a duplicate id, an empty name,
    ///   a non-positive fraction, or a pre-filled child list
    /// - `AccountNotFound` if the parent does not exist
    pub fn insert_account(&mut self, mut account: Account) -> LedgerResult<AccountId> {
        if account.account_type == AccountType::Root {
            return Err(LedgerError::invalid("ledger already has a root account"));
        }
        if self.accounts.contains_key(&account.id) {
            return Err(LedgerError::invalid(format!("duplicate account id {}", account.id)));
        }
        if account.name.trim().is_empty() {
            return Err(LedgerError::invalid("account name must not be empty"));
        }
        if account.fraction <= 0 {
            return Err(LedgerError::invalid(format!(
                "account fraction must be positive, got {}",
                account.fraction
            )));
        }
        if !account.children.is_empty() {
            return Err(LedgerError::invalid("new account cannot have children"));
        }

        let parent = account.parent_id.unwrap_or(self.root);
        self.account(parent)?;
        account.parent_id = Some(parent);

        let id = account.id;
        self.accounts.insert(id, account);
        if let Some(parent_account) = self.accounts.get_mut(&parent) {
            parent_account.children.push(id);
        }
        self.changed(EntityRef::Account(id), ChangeField::Created);
        self.changed(EntityRef::Account(parent), ChangeField::Children);
        Ok(id)
    }

    /// Moves an account below another parent
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when re-parenting the root, parenting an account to
    /// itself, or to one of its own descendants.
    pub fn set_account_parent(&mut self, id: AccountId, parent: AccountId) -> LedgerResult<()> {
        if id == self.root {
            return Err(LedgerError::invalid("the root account has no parent"));
        }
        if id == parent {
            return Err(LedgerError::invalid(format!("account {} cannot be its own parent", id)));
        }
        let old_parent = self.account(id)?.parent_id;
        self.account(parent)?;
        if self.is_ancestor(id, parent)? {
            return Err(LedgerError::invalid(format!(
                "account {} is an ancestor of {}",
                id, parent
            )));
        }
        if old_parent == Some(parent) {
            return Ok(());
        }

        if let Some(old) = old_parent {
            if let Some(old_account) = self.accounts.get_mut(&old) {
                old_account.children.retain(|child| *child != id);
            }
            self.changed(EntityRef::Account(old), ChangeField::Children);
        }
        if let Some(new_parent) = self.accounts.get_mut(&parent) {
            new_parent.children.push(id);
        }
        if let Some(account) = self.accounts.get_mut(&id) {
            account.parent_id = Some(parent);
        }
        self.changed(EntityRef::Account(parent), ChangeField::Children);
        self.changed(EntityRef::Account(id), ChangeField::Parent);
        Ok(())
    }

    /// True if `ancestor` appears on the parent chain of `account` (or is it)
    pub fn is_ancestor(&self, ancestor: AccountId, account: AccountId) -> LedgerResult<bool> {
        let mut current = Some(account);
        let mut steps = 0usize;
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            steps += 1;
            if steps > self.accounts.len() {
                return Err(LedgerError::invalid("account tree contains a cycle"));
            }
            current = self.account(id)?.parent_id;
        }
        Ok(false)
    }

    /// Changes the commodity of an account without splits
    pub fn set_account_currency(&mut self, id: AccountId, currency: Currency) -> LedgerResult<()> {
        let account = self.account(id)?;
        if account.currency == currency {
            return Ok(());
        }
        if !self.splits_of_account(id).is_empty() {
            return Err(LedgerError::AccountInUse(format!(
                "account {} has splits; its currency cannot change",
                id
            )));
        }
        if let Some(account) = self.accounts.get_mut(&id) {
            account.currency = currency;
            account.fraction = currency.smallest_fraction();
        }
        self.changed(EntityRef::Account(id), ChangeField::Currency);
        Ok(())
    }

    pub fn set_account_fraction(&mut self, id: AccountId, fraction: i64) -> LedgerResult<()> {
        self.account(id)?;
        if fraction <= 0 {
            return Err(LedgerError::invalid(format!(
                "account fraction must be positive, got {}",
                fraction
            )));
        }
        if let Some(account) = self.accounts.get_mut(&id) {
            account.fraction = fraction;
        }
        self.changed(EntityRef::Account(id), ChangeField::Attributes);
        Ok(())
    }

    /// Removes a leaf account nothing refers to
    ///
    /// # Errors
    ///
    /// `AccountInUse` if the account owns splits, children or lots, or is
    /// referenced by a tax table, an entry or a posted document.
    pub fn remove_account(&mut self, id: AccountId) -> LedgerResult<()> {
        if id == self.root {
            return Err(LedgerError::invalid("the root account cannot be removed"));
        }
        let account = self.account(id)?;
        if !account.children.is_empty() {
            return Err(LedgerError::AccountInUse(format!(
                "account {} has {} child accounts",
                id,
                account.children.len()
            )));
        }
        let parent = account.parent_id;
        if !self.splits_of_account(id).is_empty() {
            return Err(LedgerError::AccountInUse(format!(
                "account {} has {} splits",
                id,
                self.splits_of_account(id).len()
            )));
        }
        if self.lots.values().any(|lot| lot.account_id == id) {
            return Err(LedgerError::AccountInUse(format!("account {} owns lots", id)));
        }
        let in_tax_table = self
            .tax_tables
            .values()
            .any(|t| t.entries.iter().any(|e| e.account_id == id));
        let in_entry = self.entries.values().any(|e| e.terms.account_id == Some(id));
        let in_posting = self.documents.values().any(|d| {
            d.posting
                .as_ref()
                .is_some_and(|p| p.post_account == id || p.book_account == id)
        });
        if in_tax_table || in_entry || in_posting {
            return Err(LedgerError::AccountInUse(format!(
                "account {} is referenced by tax tables or documents",
                id
            )));
        }

        self.accounts.remove(&id);
        self.account_splits.remove(&id);
        if let Some(parent) = parent {
            if let Some(parent_account) = self.accounts.get_mut(&parent) {
                parent_account.children.retain(|child| *child != id);
            }
            self.changed(EntityRef::Account(parent), ChangeField::Children);
        }
        self.changed(EntityRef::Account(id), ChangeField::Removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions and splits
    // ------------------------------------------------------------------

    /// Creates an empty transaction
    pub fn create_transaction(
        &mut self,
        currency: Currency,
        description: impl Into<String>,
        date_posted: NaiveDate,
    ) -> TransactionId {
        let id = self.next_id();
        let tx = Transaction::new(id, currency, description, date_posted);
        self.transactions.insert(id, tx);
        self.changed(EntityRef::Transaction(id), ChangeField::Created);
        id
    }

    /// Creates two splits in `transaction`: `debit` gets `+value`, `credit`
    /// gets `-value`
    pub fn create_split_pair(
        &mut self,
        transaction: TransactionId,
        debit: SplitDraft,
        credit: SplitDraft,
        value: Money,
    ) -> LedgerResult<(SplitId, SplitId)> {
        self.ensure_free_transaction(transaction)?;
        self.move_value(transaction, SplitTarget::New(debit), SplitTarget::New(credit), value)
    }

    /// Adds `delta` to split `to` and subtracts it from split `from`
    pub fn update_split_pair(&mut self, to: SplitId, from: SplitId, delta: Money) -> LedgerResult<()> {
        let transaction = self.split(to)?.transaction_id;
        self.ensure_free_transaction(transaction)?;
        self.move_value(transaction, SplitTarget::Existing(to), SplitTarget::Existing(from), delta)?;
        Ok(())
    }

    /// Removes a split whose value and quantity are both zero
    pub fn remove_split(&mut self, id: SplitId) -> LedgerResult<()> {
        let transaction = self.split(id)?.transaction_id;
        self.ensure_free_transaction(transaction)?;
        self.drop_zero_split(id)
    }

    /// Re-books a split on another account of the same commodity
    pub fn move_split_to_account(&mut self, id: SplitId, account: AccountId) -> LedgerResult<()> {
        let split = self.split(id)?;
        let (transaction, old_account, lot) = (split.transaction_id, split.account_id, split.lot_id);
        self.ensure_free_transaction(transaction)?;
        if old_account == account {
            return Ok(());
        }
        if self.account(account)?.currency != self.account(old_account)?.currency {
            return Err(LedgerError::invalid(
                "split can only move between accounts of the same commodity",
            ));
        }
        if lot.is_some() {
            return Err(LedgerError::invalid("split belongs to a lot and is bound to its account"));
        }

        if let Some(list) = self.account_splits.get_mut(&old_account) {
            list.retain(|s| *s != id);
        }
        self.account_splits.entry(account).or_default().push(id);
        if let Some(split) = self.splits.get_mut(&id) {
            split.account_id = account;
        }
        self.changed(EntityRef::Split(id), ChangeField::Account);
        self.changed(EntityRef::Account(old_account), ChangeField::Splits);
        self.changed(EntityRef::Account(account), ChangeField::Splits);
        Ok(())
    }

    /// Changes the accounting date of a transaction (and so of its splits)
    pub fn set_transaction_date(&mut self, id: TransactionId, date: NaiveDate) -> LedgerResult<()> {
        self.ensure_free_transaction(id)?;
        self.redate_transaction(id, date)
    }

    /// Removes a transaction together with all its splits
    pub fn remove_transaction(&mut self, id: TransactionId) -> LedgerResult<()> {
        self.ensure_free_transaction(id)?;
        self.drop_transaction(id)
    }

    fn ensure_free_transaction(&self, id: TransactionId) -> LedgerResult<()> {
        if let Some(document) = self.transaction(id)?.document_id {
            return Err(LedgerError::invalid(format!(
                "transaction {} is maintained by document {}",
                id, document
            )));
        }
        Ok(())
    }

    /// Quantity per unit of value for a split target
    fn quantity_ratio(&self, currency: Currency, target: &SplitTarget) -> LedgerResult<Decimal> {
        match target {
            SplitTarget::New(draft) => {
                let account = self.account(draft.account_id)?;
                if account.currency == currency {
                    return Ok(Decimal::ONE);
                }
                draft.price.ok_or_else(|| {
                    LedgerError::invalid(format!(
                        "account {} is in {}, a price is required for {} splits",
                        account.id, account.currency, currency
                    ))
                })
            }
            SplitTarget::Existing(id) => {
                let split = self.split(*id)?;
                if split.value.currency() == split.quantity.currency() {
                    return Ok(Decimal::ONE);
                }
                if split.value.is_zero() {
                    return Err(LedgerError::invalid(format!(
                        "split {} has no value to derive a price from",
                        id
                    )));
                }
                split
                    .quantity
                    .amount()
                    .checked_div(split.value.amount())
                    .ok_or_else(|| LedgerError::Money(MoneyError::Overflow))
            }
        }
    }

    fn validate_target(&self, transaction: TransactionId, target: &SplitTarget) -> LedgerResult<()> {
        match target {
            SplitTarget::Existing(id) => {
                if self.split(*id)?.transaction_id != transaction {
                    return Err(LedgerError::invalid(format!(
                        "split {} does not belong to transaction {}",
                        id, transaction
                    )));
                }
            }
            SplitTarget::New(draft) => {
                self.account(draft.account_id)?;
                if let Some(lot_id) = draft.lot_id {
                    if self.lot(lot_id)?.account_id != draft.account_id {
                        return Err(LedgerError::invalid(format!(
                            "lot {} belongs to another account",
                            lot_id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// The one primitive that changes split amounts: `to` gains `amount`,
    /// `from` loses it. New targets are created first.
    pub(crate) fn move_value(
        &mut self,
        transaction: TransactionId,
        to: SplitTarget,
        from: SplitTarget,
        amount: Money,
    ) -> LedgerResult<(SplitId, SplitId)> {
        let currency = self.transaction(transaction)?.currency;
        if amount.currency() != currency {
            return Err(LedgerError::invalid(format!(
                "amount in {} does not match transaction currency {}",
                amount.currency(),
                currency
            )));
        }
        if let (SplitTarget::Existing(a), SplitTarget::Existing(b)) = (&to, &from) {
            if a == b {
                return Err(LedgerError::invalid("a split cannot be paired with itself"));
            }
        }
        self.validate_target(transaction, &to)?;
        self.validate_target(transaction, &from)?;
        let to_ratio = self.quantity_ratio(currency, &to)?;
        let from_ratio = self.quantity_ratio(currency, &from)?;
        let to_amounts = self.adjusted_amounts(currency, &to, amount, to_ratio)?;
        let from_amounts = self.adjusted_amounts(currency, &from, -amount, from_ratio)?;

        let to_id = self.materialize(transaction, to)?;
        let from_id = self.materialize(transaction, from)?;
        if !amount.is_zero() {
            self.set_split_amounts(to_id, to_amounts);
            self.set_split_amounts(from_id, from_amounts);
        }

        debug!(
            transaction = %transaction,
            to = %to_id,
            from = %from_id,
            amount = %amount,
            "Moved value between splits"
        );
        Ok((to_id, from_id))
    }

    fn materialize(&mut self, transaction: TransactionId, target: SplitTarget) -> LedgerResult<SplitId> {
        match target {
            SplitTarget::Existing(id) => Ok(id),
            SplitTarget::New(draft) => self.insert_zero_split(transaction, draft),
        }
    }

    /// Value and quantity `target` ends up with after gaining `value_delta`
    fn adjusted_amounts(
        &self,
        currency: Currency,
        target: &SplitTarget,
        value_delta: Money,
        ratio: Decimal,
    ) -> LedgerResult<(Money, Money)> {
        let (value, quantity) = match target {
            SplitTarget::Existing(id) => {
                let split = self.split(*id)?;
                (split.value, split.quantity)
            }
            SplitTarget::New(draft) => (
                Money::zero(currency),
                Money::zero(self.account(draft.account_id)?.currency),
            ),
        };
        let quantity_delta = value_delta
            .amount()
            .checked_mul(ratio)
            .ok_or(MoneyError::Overflow)?;
        Ok((
            value.checked_add(&value_delta)?,
            quantity.checked_add(&Money::new(quantity_delta, quantity.currency()))?,
        ))
    }

    fn set_split_amounts(&mut self, id: SplitId, (value, quantity): (Money, Money)) {
        if let Some(split) = self.splits.get_mut(&id) {
            split.value = value;
            split.quantity = quantity;
        }
        self.changed(EntityRef::Split(id), ChangeField::Value);
        self.changed(EntityRef::Split(id), ChangeField::Quantity);
    }

    /// Adds a split with zero value and quantity; balance-neutral
    pub(crate) fn insert_zero_split(
        &mut self,
        transaction: TransactionId,
        draft: SplitDraft,
    ) -> LedgerResult<SplitId> {
        let currency = self.transaction(transaction)?.currency;
        self.validate_target(transaction, &SplitTarget::New(draft.clone()))?;
        let account_currency = self.account(draft.account_id)?.currency;

        let id: SplitId = self.next_id();
        let split = Split {
            id,
            transaction_id: transaction,
            account_id: draft.account_id,
            value: Money::zero(currency),
            quantity: Money::zero(account_currency),
            action: draft.action,
            memo: draft.memo,
            lot_id: draft.lot_id,
        };
        self.splits.insert(id, split);
        if let Some(tx) = self.transactions.get_mut(&transaction) {
            tx.splits.push(id);
        }
        self.account_splits.entry(draft.account_id).or_default().push(id);
        self.changed(EntityRef::Split(id), ChangeField::Created);
        self.changed(EntityRef::Transaction(transaction), ChangeField::Splits);
        self.changed(EntityRef::Account(draft.account_id), ChangeField::Splits);
        if let Some(lot_id) = draft.lot_id {
            self.lot_splits.entry(lot_id).or_default().push(id);
            self.changed(EntityRef::Lot(lot_id), ChangeField::Splits);
        }
        Ok(id)
    }

    pub(crate) fn drop_zero_split(&mut self, id: SplitId) -> LedgerResult<()> {
        let split = self.split(id)?;
        if !split.value.is_zero() || !split.quantity.is_zero() {
            return Err(LedgerError::invalid(format!(
                "split {} still carries {}; removing it would unbalance its transaction",
                id, split.value
            )));
        }
        self.unlink_split(id);
        Ok(())
    }

    fn unlink_split(&mut self, id: SplitId) {
        let Some(split) = self.splits.remove(&id) else {
            return;
        };
        if let Some(tx) = self.transactions.get_mut(&split.transaction_id) {
            tx.splits.retain(|s| *s != id);
        }
        if let Some(list) = self.account_splits.get_mut(&split.account_id) {
            list.retain(|s| *s != id);
        }
        self.changed(EntityRef::Split(id), ChangeField::Removed);
        self.changed(EntityRef::Transaction(split.transaction_id), ChangeField::Splits);
        self.changed(EntityRef::Account(split.account_id), ChangeField::Splits);
        if let Some(lot_id) = split.lot_id {
            if let Some(list) = self.lot_splits.get_mut(&lot_id) {
                list.retain(|s| *s != id);
            }
            self.changed(EntityRef::Lot(lot_id), ChangeField::Splits);
        }
    }

    pub(crate) fn redate_transaction(&mut self, id: TransactionId, date: NaiveDate) -> LedgerResult<()> {
        let tx = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))?;
        if tx.date_posted == date {
            return Ok(());
        }
        tx.date_posted = date;
        let splits = tx.splits.clone();
        self.changed(EntityRef::Transaction(id), ChangeField::Date);
        for split in splits {
            self.changed(EntityRef::Split(split), ChangeField::Date);
        }
        Ok(())
    }

    pub(crate) fn transaction_mut(&mut self, id: TransactionId) -> LedgerResult<&mut Transaction> {
        self.dirty.insert(EntityRef::Transaction(id));
        self.transactions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))
    }

    /// Removes a transaction regardless of ownership; splits go first
    pub(crate) fn drop_transaction(&mut self, id: TransactionId) -> LedgerResult<()> {
        let splits = self.transaction(id)?.splits.clone();
        for split in splits {
            self.unlink_split(split);
        }
        self.transactions.remove(&id);
        self.changed(EntityRef::Transaction(id), ChangeField::Removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lots
    // ------------------------------------------------------------------

    pub(crate) fn insert_lot(&mut self, lot: Lot) -> LedgerResult<LotId> {
        self.account(lot.account_id)?;
        let id = lot.id;
        self.lots.insert(id, lot);
        self.changed(EntityRef::Lot(id), ChangeField::Created);
        Ok(id)
    }

    pub(crate) fn drop_lot(&mut self, id: LotId) -> LedgerResult<()> {
        if !self.splits_in_lot(id).is_empty() {
            return Err(LedgerError::invalid(format!("lot {} still holds splits", id)));
        }
        self.lots
            .remove(&id)
            .ok_or_else(|| LedgerError::LotNotFound(id.to_string()))?;
        self.lot_splits.remove(&id);
        self.changed(EntityRef::Lot(id), ChangeField::Removed);
        Ok(())
    }

    /// Sum of the values of all splits in a lot
    pub fn lot_balance(&self, id: LotId) -> LedgerResult<Money> {
        let account = self.lot(id)?.account_id;
        let currency = self.account(account)?.currency;
        let quantities: Vec<Money> = self
            .splits_in_lot(id)
            .iter()
            .map(|s| self.split(*s).map(|split| split.quantity))
            .collect::<LedgerResult<_>>()?;
        Ok(Money::sum(currency, quantities.iter())?)
    }

    // ------------------------------------------------------------------
    // Tax tables and jobs
    // ------------------------------------------------------------------

    /// Adds a tax table
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty or duplicate name, or an unknown
    /// target account.
    pub fn insert_tax_table(&mut self, table: TaxTable) -> LedgerResult<TaxTableId> {
        if table.name.trim().is_empty() {
            return Err(LedgerError::invalid("tax table name must not be empty"));
        }
        if self.find_by_name(&table.name).is_some() {
            return Err(LedgerError::invalid(format!("tax table '{}' already exists", table.name)));
        }
        for entry in &table.entries {
            self.account(entry.account_id)?;
        }
        let id = table.id;
        self.tax_tables.insert(id, table);
        self.tax_table_order.push(id);
        self.changed(EntityRef::TaxTable(id), ChangeField::Created);
        Ok(id)
    }

    pub fn remove_tax_table(&mut self, id: TaxTableId) -> LedgerResult<()> {
        self.tax_table(id)?;
        if self.entries.values().any(|e| e.terms.tax_table_id == Some(id)) {
            return Err(LedgerError::invalid(format!("tax table {} is used by entries", id)));
        }
        self.tax_tables.remove(&id);
        self.tax_table_order.retain(|t| *t != id);
        self.changed(EntityRef::TaxTable(id), ChangeField::Removed);
        Ok(())
    }

    pub fn insert_job(&mut self, job: Job) -> LedgerResult<JobId> {
        if job.name.trim().is_empty() {
            return Err(LedgerError::invalid("job name must not be empty"));
        }
        let id = job.id;
        self.jobs.insert(id, job);
        self.changed(EntityRef::Job(id), ChangeField::Created);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Documents and entries (driven by the posting engine)
    // ------------------------------------------------------------------

    pub(crate) fn insert_document(&mut self, document: Document) -> DocumentId {
        let id = document.id;
        self.documents.insert(id, document);
        self.changed(EntityRef::Document(id), ChangeField::Created);
        id
    }

    pub(crate) fn document_mut(&mut self, id: DocumentId) -> LedgerResult<&mut Document> {
        self.dirty.insert(EntityRef::Document(id));
        self.documents
            .get_mut(&id)
            .ok_or_else(|| LedgerError::DocumentNotFound(id.to_string()))
    }

    pub(crate) fn drop_document(&mut self, id: DocumentId) {
        if self.documents.remove(&id).is_some() {
            self.changed(EntityRef::Document(id), ChangeField::Removed);
        }
    }

    pub(crate) fn insert_entry(&mut self, entry: Entry) -> EntryId {
        let id = entry.id;
        self.entries.insert(id, entry);
        self.changed(EntityRef::Entry(id), ChangeField::Created);
        id
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> LedgerResult<&mut Entry> {
        self.dirty.insert(EntityRef::Entry(id));
        self.entries
            .get_mut(&id)
            .ok_or_else(|| LedgerError::EntryNotFound(id.to_string()))
    }

    pub(crate) fn drop_entry(&mut self, id: EntryId) {
        if self.entries.remove(&id).is_some() {
            self.changed(EntityRef::Entry(id), ChangeField::Removed);
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Copies the graph into its serializable form
    pub fn snapshot(&self) -> EntityGraph {
        fn sorted<K: Ord + Copy + std::hash::Hash, V: Clone>(map: &HashMap<K, V>) -> Vec<V> {
            let mut keys: Vec<K> = map.keys().copied().collect();
            keys.sort();
            keys.iter().filter_map(|k| map.get(k).cloned()).collect()
        }

        EntityGraph {
            version: self.version,
            root_account: self.root,
            accounts: sorted(&self.accounts),
            transactions: sorted(&self.transactions),
            splits: sorted(&self.splits),
            lots: sorted(&self.lots),
            documents: sorted(&self.documents),
            entries: sorted(&self.entries),
            tax_tables: self
                .tax_table_order
                .iter()
                .filter_map(|id| self.tax_tables.get(id).cloned())
                .collect(),
            jobs: sorted(&self.jobs),
        }
    }

    /// Rebuilds a store from a graph, checking the tree and balance
    /// invariants
    pub fn from_graph(graph: EntityGraph, ids: Box<dyn IdSource>) -> LedgerResult<Self> {
        let root_currency = graph
            .accounts
            .iter()
            .find(|a| a.id == graph.root_account)
            .map(|a| a.currency)
            .ok_or_else(|| LedgerError::invalid("graph has no root account"))?;

        let mut store = Self::new(root_currency, ids);
        store.accounts.clear();
        store.root = graph.root_account;
        store.version = graph.version;

        let roots = graph.accounts.iter().filter(|a| a.is_root()).count();
        if roots != 1 {
            return Err(LedgerError::invalid(format!("graph has {} root accounts", roots)));
        }
        for account in graph.accounts {
            store.accounts.insert(account.id, account);
        }
        store.verify_account_tree()?;

        store.transactions = graph.transactions.into_iter().map(|t| (t.id, t)).collect();
        store.lots = graph.lots.into_iter().map(|l| (l.id, l)).collect();
        store.documents = graph.documents.into_iter().map(|d| (d.id, d)).collect();
        store.entries = graph.entries.into_iter().map(|e| (e.id, e)).collect();
        store.jobs = graph.jobs.into_iter().map(|j| (j.id, j)).collect();
        store.tax_table_order = graph.tax_tables.iter().map(|t| t.id).collect();
        store.tax_tables = graph.tax_tables.into_iter().map(|t| (t.id, t)).collect();
        store.splits = graph.splits.into_iter().map(|s| (s.id, s)).collect();

        let tx_ids: Vec<TransactionId> = store.transactions.keys().copied().collect();
        for tx_id in tx_ids {
            let split_ids = store.transaction(tx_id)?.splits.clone();
            for split_id in split_ids {
                let split = store.split(split_id)?;
                if split.transaction_id != tx_id {
                    return Err(LedgerError::invalid(format!(
                        "split {} is listed by transaction {} but belongs to {}",
                        split_id, tx_id, split.transaction_id
                    )));
                }
                let (account, lot) = (split.account_id, split.lot_id);
                store.account(account)?;
                store.account_splits.entry(account).or_default().push(split_id);
                if let Some(lot) = lot {
                    store.lot(lot)?;
                    store.lot_splits.entry(lot).or_default().push(split_id);
                }
            }
            store.check_balanced(tx_id)?;
        }
        let indexed: usize = store.account_splits.values().map(Vec::len).sum();
        if indexed != store.splits.len() {
            return Err(LedgerError::invalid("graph contains splits outside any transaction"));
        }

        store.dirty.clear();
        Ok(store)
    }

    fn verify_account_tree(&self) -> LedgerResult<()> {
        for account in self.accounts.values() {
            match account.parent_id {
                None if account.id != self.root => {
                    return Err(LedgerError::invalid(format!("account {} has no parent", account.id)));
                }
                Some(parent) => {
                    if account.id == self.root {
                        return Err(LedgerError::invalid("the root account has a parent"));
                    }
                    if !self.account(parent)?.children.contains(&account.id) {
                        return Err(LedgerError::invalid(format!(
                            "account {} is missing from its parent's children",
                            account.id
                        )));
                    }
                    // walking up from every account detects cycles
                    self.is_ancestor(self.root, account.id)?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

impl TaxTableRepository for EntityStore {
    fn find_by_name(&self, name: &str) -> Option<&TaxTable> {
        self.tax_table_order
            .iter()
            .filter_map(|id| self.tax_tables.get(id))
            .find(|t| t.name == name)
    }

    fn first_available(&self) -> Option<&TaxTable> {
        self.tax_table_order
            .first()
            .and_then(|id| self.tax_tables.get(id))
    }
}
