//! Document posting engine
//!
//! A document moves `Unposted -> Posted` exactly once. Posting creates a lot
//! on the post (receivable/payable) account and a posting transaction holding:
//!
//! - one split on the post account, in the lot, carrying minus the gross
//!   total of all entries,
//! - one split per book account carrying the net sums booked there,
//! - one split per tax account carrying the tax.
//!
//! Afterwards the transaction is only changed by [`update_posting_splits`],
//! which moves one entry's contribution between the post split and the
//! book/tax splits as balanced pairs.
//!
//! A document stays modifiable until some other transaction puts a split into
//! its lot (a payment). From then on entries and owner are frozen.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use core_kernel::{AccountId, Currency, DocumentId, LotId, Money, SplitId, TransactionId};

use crate::document::{
    Document, DocumentKind, DocumentTotals, Entry, EntrySide, EntryTerms, Owner, OwnerKind,
    PostingRecord,
};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{ChangeField, EntityRef};
use crate::lot::Lot;
use crate::store::EntityStore;
use crate::tax::{self, TaxComputation, TaxFallback};
use crate::transaction::{SplitAction, SplitDraft, SplitTarget};

/// Input for opening a document
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub owner: Owner,
    pub number: String,
    pub currency: Currency,
    pub date_opened: NaiveDate,
    pub notes: Option<String>,
}

impl NewDocument {
    pub fn new(
        kind: DocumentKind,
        owner: Owner,
        number: impl Into<String>,
        currency: Currency,
        date_opened: NaiveDate,
    ) -> Self {
        Self {
            kind,
            owner,
            number: number.into(),
            currency,
            date_opened,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Parameters of `post`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRequest {
    /// Owner kind the caller posts as; a job-owned document also accepts its
    /// job's owner kind
    pub owner_kind: OwnerKind,
    pub post_account: AccountId,
    pub book_account: AccountId,
    pub post_date: NaiveDate,
    pub due_date: NaiveDate,
    pub memo: Option<String>,
}

/// Parameters of `pay`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Bank/cash account the money moves through
    pub account: AccountId,
    pub amount: Money,
    pub date: NaiveDate,
    pub memo: Option<String>,
}

/// What one entry adds to a posting transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contribution {
    pub book_account: AccountId,
    pub sums: TaxComputation,
}

impl Contribution {
    pub fn negated(&self) -> Self {
        Self {
            book_account: self.book_account,
            sums: self.sums.negated(),
        }
    }
}

// ----------------------------------------------------------------------
// Owners and sides
// ----------------------------------------------------------------------

/// Owner kind after resolving jobs to the party they are run for
pub fn effective_owner_kind(store: &EntityStore, owner: &Owner) -> LedgerResult<OwnerKind> {
    match owner {
        Owner::Job(job) => Ok(store.job(*job)?.owner.kind()),
        other => Ok(other.kind()),
    }
}

/// Active entry side for documents of `owner`
pub fn resolve_side(store: &EntityStore, owner: &Owner) -> LedgerResult<EntrySide> {
    let kind = effective_owner_kind(store, owner)?;
    EntrySide::for_owner_kind(kind)
        .ok_or_else(|| LedgerError::invalid(format!("no entry side for {} owners", kind)))
}

/// Opens an unposted document
///
/// # Errors
///
/// - `WrongOwnerType` if the owner does not fit the document kind
/// - `JobNotFound` for an unknown job owner
/// - `InvalidArgument` for an empty number
pub fn open_document(store: &mut EntityStore, new: NewDocument) -> LedgerResult<DocumentId> {
    if new.owner.kind() != new.kind.owner_kind() {
        return Err(LedgerError::wrong_owner_type(new.kind.owner_kind(), new.owner.kind()));
    }
    if new.number.trim().is_empty() {
        return Err(LedgerError::invalid("document number must not be empty"));
    }
    let side = resolve_side(store, &new.owner)?;

    let id = store.next_id();
    store.insert_document(Document {
        id,
        number: new.number,
        kind: new.kind,
        owner: new.owner,
        side,
        currency: new.currency,
        entries: Vec::new(),
        date_opened: new.date_opened,
        notes: new.notes,
        posting: None,
    });
    Ok(id)
}

/// Replaces the owner of a modifiable document
///
/// The active side may only change while the document has no entries.
pub fn set_owner(store: &mut EntityStore, document_id: DocumentId, owner: Owner) -> LedgerResult<()> {
    ensure_modifiable(store, document_id)?;
    let document = store.document(document_id)?;
    if owner.kind() != document.kind.owner_kind() {
        return Err(LedgerError::wrong_owner_type(document.kind.owner_kind(), owner.kind()));
    }
    let side = resolve_side(store, &owner)?;
    if side != document.side && !document.entries.is_empty() {
        return Err(LedgerError::invalid(format!(
            "document {} has entries on the {} side",
            document.number, document.side
        )));
    }

    let document = store.document_mut(document_id)?;
    document.owner = owner;
    document.side = side;
    store.changed(EntityRef::Document(document_id), ChangeField::Owner);
    Ok(())
}

// ----------------------------------------------------------------------
// Modifiability
// ----------------------------------------------------------------------

/// Transactions other than the posting transaction that touch the
/// document's lot
pub fn paying_transactions(store: &EntityStore, document_id: DocumentId) -> LedgerResult<Vec<TransactionId>> {
    let document = store.document(document_id)?;
    let Some(posting) = &document.posting else {
        return Ok(Vec::new());
    };

    let mut paying = BTreeSet::new();
    for split_id in store.splits_in_lot(posting.lot_id) {
        let tx = store.split(*split_id)?.transaction_id;
        if tx != posting.transaction_id {
            paying.insert(tx);
        }
    }
    Ok(paying.into_iter().collect())
}

pub fn is_modifiable(store: &EntityStore, document_id: DocumentId) -> LedgerResult<bool> {
    Ok(paying_transactions(store, document_id)?.is_empty())
}

pub(crate) fn ensure_modifiable(store: &EntityStore, document_id: DocumentId) -> LedgerResult<()> {
    let paying = paying_transactions(store, document_id)?;
    if !paying.is_empty() {
        let number = &store.document(document_id)?.number;
        return Err(LedgerError::NotModifiable(format!(
            "document {} has {} paying transaction(s)",
            number,
            paying.len()
        )));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Entry contributions
// ----------------------------------------------------------------------

/// Net and gross sums of one entry's terms
///
/// # Errors
///
/// `TaxTableNotFound` when taxable and neither the entry's own table nor the
/// fallback resolves.
pub fn entry_sums(
    store: &EntityStore,
    quantity: rust_decimal::Decimal,
    terms: &EntryTerms,
    fallback: TaxFallback,
) -> LedgerResult<TaxComputation> {
    let table = match (terms.taxable, terms.tax_table_id) {
        (false, _) => None,
        (true, Some(id)) => Some(store.tax_table(id)?),
        (true, None) => fallback.resolve(store),
    };
    tax::compute(quantity, terms.price, terms.taxable, table)
}

/// Contribution of `entry` when booked with `default_book` as fallback
/// book account
///
/// Also checks that every account it books against exists and is kept in
/// `currency`.
fn contribution_for(
    store: &EntityStore,
    entry: &Entry,
    default_book: AccountId,
    currency: Currency,
    fallback: TaxFallback,
) -> LedgerResult<Contribution> {
    let sums = entry_sums(store, entry.quantity, &entry.terms, fallback)?;
    let contribution = Contribution {
        book_account: entry.terms.account_id.unwrap_or(default_book),
        sums,
    };
    ensure_account_currency(store, contribution.book_account, currency)?;
    if let Some(tax_account) = contribution.sums.tax_account {
        ensure_account_currency(store, tax_account, currency)?;
    }
    Ok(contribution)
}

/// Validated contribution of `entry` to the posting transaction of
/// `document`; `None` while the document is unposted
///
/// Tax resolution runs for unposted documents too, so a taxable entry
/// without any table is rejected either way.
pub(crate) fn entry_contribution(
    store: &EntityStore,
    document: &Document,
    entry: &Entry,
    fallback: TaxFallback,
) -> LedgerResult<Option<Contribution>> {
    match &document.posting {
        Some(posting) => {
            contribution_for(store, entry, posting.book_account, document.currency, fallback).map(Some)
        }
        None => {
            entry_sums(store, entry.quantity, &entry.terms, fallback)?;
            Ok(None)
        }
    }
}

pub(crate) fn ensure_account_currency(
    store: &EntityStore,
    account: AccountId,
    currency: Currency,
) -> LedgerResult<()> {
    let account = store.account(account)?;
    if account.currency != currency {
        return Err(LedgerError::invalid(format!(
            "account {} is kept in {}, expected {}",
            account.name, account.currency, currency
        )));
    }
    Ok(())
}

fn find_split(
    store: &EntityStore,
    transaction: TransactionId,
    account: AccountId,
    lot: Option<LotId>,
) -> LedgerResult<Option<SplitId>> {
    Ok(store
        .splits_of_transaction(transaction)?
        .into_iter()
        .find(|s| s.account_id == account && s.lot_id == lot)
        .map(|s| s.id))
}

fn split_target(
    store: &EntityStore,
    transaction: TransactionId,
    account: AccountId,
    lot: Option<LotId>,
    action: SplitAction,
) -> LedgerResult<SplitTarget> {
    Ok(match find_split(store, transaction, account, lot)? {
        Some(id) => SplitTarget::Existing(id),
        None => {
            let mut draft = SplitDraft::new(account).with_action(action);
            draft.lot_id = lot;
            SplitTarget::New(draft)
        }
    })
}

/// Moves a contribution into (or, negated, out of) the posting transaction
///
/// No-op for unposted documents. The net sum moves from the post split to
/// the book split; for taxed contributions the tax moves from the post split
/// to the tax split. Missing splits are created on first use.
pub fn update_posting_splits(
    store: &mut EntityStore,
    document: &Document,
    contribution: &Contribution,
) -> LedgerResult<()> {
    let Some(posting) = &document.posting else {
        return Ok(());
    };
    let tx = posting.transaction_id;
    let action = document.side.profile().action;
    let mut post = split_target(store, tx, posting.post_account, Some(posting.lot_id), action)?;

    let net = contribution.sums.sum_excl_tax;
    if !net.is_zero() {
        let book = split_target(store, tx, contribution.book_account, None, action)?;
        let (_, post_id) = store.move_value(tx, book, post, net)?;
        post = SplitTarget::Existing(post_id);
    }

    if let Some(tax_account) = contribution.sums.tax_account {
        let tax = contribution.sums.tax();
        if !tax.is_zero() {
            let target = split_target(store, tx, tax_account, None, action)?;
            store.move_value(tx, target, post, tax)?;
        }
    }
    Ok(())
}

/// Replays `contributions` against the posting split values with checked
/// arithmetic, so an amount that would not fit fails before any split moves
pub fn ensure_posting_headroom(
    store: &EntityStore,
    document: &Document,
    contributions: &[Contribution],
) -> LedgerResult<()> {
    let Some(posting) = &document.posting else {
        return Ok(());
    };
    let mut values: HashMap<(AccountId, bool), Money> = store
        .splits_of_transaction(posting.transaction_id)?
        .into_iter()
        .map(|split| ((split.account_id, split.lot_id.is_some()), split.value))
        .collect();
    replay_contributions(&mut values, posting.post_account, contributions)
}

/// Split values are keyed by account and whether the split sits in the lot
fn replay_contributions(
    values: &mut HashMap<(AccountId, bool), Money>,
    post_account: AccountId,
    contributions: &[Contribution],
) -> LedgerResult<()> {
    let post = (post_account, true);
    for contribution in contributions {
        let sums = &contribution.sums;
        let mut moves = vec![
            ((contribution.book_account, false), sums.sum_excl_tax),
            (post, -sums.sum_excl_tax),
        ];
        if let Some(tax_account) = sums.tax_account {
            let tax = sums.sum_incl_tax.checked_sub(&sums.sum_excl_tax)?;
            moves.push(((tax_account, false), tax));
            moves.push((post, -tax));
        }
        for (key, amount) in moves {
            let current = values
                .get(&key)
                .copied()
                .unwrap_or_else(|| Money::zero(amount.currency()));
            values.insert(key, current.checked_add(&amount)?);
        }
    }
    Ok(())
}

/// Drops every split of the posting transaction whose value returned to zero
///
/// The post split goes too; `update_posting_splits` re-creates it in the
/// document's lot when an amount flows again.
pub fn prune_posting_splits(store: &mut EntityStore, document: &Document) -> LedgerResult<()> {
    let Some(posting) = &document.posting else {
        return Ok(());
    };
    let empty: Vec<SplitId> = store
        .splits_of_transaction(posting.transaction_id)?
        .into_iter()
        .filter(|s| s.value.is_zero() && s.quantity.is_zero())
        .map(|s| s.id)
        .collect();
    for split in empty {
        store.drop_zero_split(split)?;
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Posting
// ----------------------------------------------------------------------

/// Posts a document to the ledger
///
/// # Arguments
///
/// * `store` - Entity store
/// * `document_id` - Document to post
/// * `request` - Accounts, dates and the owner kind the caller posts as
/// * `fallback` - Tax table fallback for taxable entries without a table
///
/// # Returns
///
/// The posting transaction
///
/// # Errors
///
/// - `AlreadyPosted` on a second post
/// - `WrongOwnerType` if the requested owner kind does not match
/// - `InvalidArgument` for accounts in another currency or a due date
///   before the post date
/// - `TaxTableNotFound` if an entry's tax table cannot be resolved
pub fn post_document(
    store: &mut EntityStore,
    document_id: DocumentId,
    request: &PostRequest,
    fallback: TaxFallback,
) -> LedgerResult<TransactionId> {
    let document = store.document(document_id)?.clone();
    if document.is_posted() {
        return Err(LedgerError::AlreadyPosted(document.number.clone()));
    }
    ensure_modifiable(store, document_id)?;

    let effective = effective_owner_kind(store, &document.owner)?;
    if request.owner_kind != document.owner.kind() && request.owner_kind != effective {
        return Err(LedgerError::wrong_owner_type(effective, request.owner_kind));
    }
    if request.due_date < request.post_date {
        return Err(LedgerError::invalid(format!(
            "due date {} precedes post date {}",
            request.due_date, request.post_date
        )));
    }
    ensure_account_currency(store, request.post_account, document.currency)?;
    ensure_account_currency(store, request.book_account, document.currency)?;

    let profile = document.side.profile();
    let post_type = store.account(request.post_account)?.account_type;
    if post_type != profile.post_account_type {
        warn!(
            document = %document.number,
            account_type = %post_type,
            expected = %profile.post_account_type,
            "Posting to an account of unexpected type"
        );
    }

    let contributions = document
        .entries
        .iter()
        .map(|entry_id| {
            let entry = store.entry(*entry_id)?;
            contribution_for(store, entry, request.book_account, document.currency, fallback)
        })
        .collect::<LedgerResult<Vec<_>>>()?;

    replay_contributions(&mut HashMap::new(), request.post_account, &contributions)?;

    let title = format!("{} {}", profile.label, document.number);
    let lot_id = store.next_id();
    store.insert_lot(Lot::new(lot_id, request.post_account, title.clone()).for_document(document_id))?;

    let tx = store.create_transaction(document.currency, title, request.post_date);
    {
        let transaction = store.transaction_mut(tx)?;
        transaction.number = Some(document.number.clone());
        transaction.document_id = Some(document_id);
    }
    let mut anchor = SplitDraft::new(request.post_account)
        .with_action(profile.action)
        .in_lot(lot_id);
    anchor.memo = request.memo.clone();
    store.insert_zero_split(tx, anchor)?;

    let record = PostingRecord {
        transaction_id: tx,
        lot_id,
        post_account: request.post_account,
        book_account: request.book_account,
        date_posted: request.post_date,
        date_due: request.due_date,
    };
    store.document_mut(document_id)?.posting = Some(record.clone());
    store.changed(EntityRef::Document(document_id), ChangeField::Attributes);
    let mut posted = document.clone();
    posted.posting = Some(record);

    for contribution in &contributions {
        update_posting_splits(store, &posted, contribution)?;
    }
    prune_posting_splits(store, &posted)?;

    info!(
        document = %document.number,
        kind = %document.kind,
        transaction = %tx,
        lot = %lot_id,
        entries = contributions.len(),
        "Posted document"
    );
    Ok(tx)
}

// ----------------------------------------------------------------------
// Payments and totals
// ----------------------------------------------------------------------

/// Outstanding amount of a posted document; zero while unposted
pub fn amount_due(store: &EntityStore, document_id: DocumentId) -> LedgerResult<Money> {
    let document = store.document(document_id)?;
    match &document.posting {
        Some(posting) => Ok(-store.lot_balance(posting.lot_id)?),
        None => Ok(Money::zero(document.currency)),
    }
}

pub fn is_paid(store: &EntityStore, document_id: DocumentId) -> LedgerResult<bool> {
    let posted = store.document(document_id)?.is_posted();
    Ok(posted && amount_due(store, document_id)?.is_zero())
}

/// Records a payment against a posted document
///
/// Creates a transaction with a split on the post account in the
/// document's lot and a counter split on the payment account. The document
/// is frozen afterwards.
///
/// # Errors
///
/// `InvalidArgument` if the document is unposted, the amount is not
/// positive, is in another currency, or exceeds the amount due.
pub fn pay_document(
    store: &mut EntityStore,
    document_id: DocumentId,
    request: &PaymentRequest,
) -> LedgerResult<TransactionId> {
    let document = store.document(document_id)?.clone();
    let Some(posting) = &document.posting else {
        return Err(LedgerError::invalid(format!(
            "document {} is not posted",
            document.number
        )));
    };
    if request.amount.currency() != document.currency {
        return Err(LedgerError::invalid(format!(
            "payment in {} for a document in {}",
            request.amount.currency(),
            document.currency
        )));
    }
    if !request.amount.is_positive() {
        return Err(LedgerError::invalid("payment amount must be positive"));
    }
    let due = amount_due(store, document_id)?;
    if request.amount.amount() > due.amount() {
        return Err(LedgerError::invalid(format!(
            "payment of {} exceeds the {} due on {}",
            request.amount, due, document.number
        )));
    }
    ensure_account_currency(store, request.account, document.currency)?;

    let tx = store.create_transaction(
        document.currency,
        format!("Payment for {}", document.number),
        request.date,
    );
    let settle = SplitDraft::new(posting.post_account)
        .with_action(SplitAction::Payment)
        .in_lot(posting.lot_id);
    let mut funds = SplitDraft::new(request.account).with_action(SplitAction::Payment);
    funds.memo = request.memo.clone();
    store.move_value(tx, SplitTarget::New(settle), SplitTarget::New(funds), request.amount)?;

    info!(
        document = %document.number,
        transaction = %tx,
        amount = %request.amount,
        "Recorded payment"
    );
    Ok(tx)
}

/// Sums over all entries, recomputed from the entries themselves
pub fn document_totals(
    store: &EntityStore,
    document_id: DocumentId,
    fallback: TaxFallback,
) -> LedgerResult<DocumentTotals> {
    let document = store.document(document_id)?;
    let mut totals = DocumentTotals {
        total_excl_tax: Money::zero(document.currency),
        total_incl_tax: Money::zero(document.currency),
    };
    for entry_id in &document.entries {
        let entry = store.entry(*entry_id)?;
        let sums = entry_sums(store, entry.quantity, &entry.terms, fallback)?;
        totals.total_excl_tax = totals.total_excl_tax.checked_add(&sums.sum_excl_tax)?;
        totals.total_incl_tax = totals.total_incl_tax.checked_add(&sums.sum_incl_tax)?;
    }
    Ok(totals)
}

/// Removes a modifiable document with its entries, posting transaction and
/// lot
pub fn remove_document(store: &mut EntityStore, document_id: DocumentId) -> LedgerResult<()> {
    ensure_modifiable(store, document_id)?;
    let document = store.document(document_id)?.clone();

    if let Some(posting) = &document.posting {
        store.drop_transaction(posting.transaction_id)?;
        store.drop_lot(posting.lot_id)?;
    }
    for entry in &document.entries {
        store.drop_entry(*entry);
    }
    store.drop_document(document_id);

    info!(document = %document.number, entries = document.entries.len(), "Removed document");
    Ok(())
}
