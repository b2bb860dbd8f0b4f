//! Entry mutations
//!
//! Every change to an entry of a posted document goes through the same three
//! steps: subtract the entry's current contribution from the posting
//! transaction, change the entry, add the new contribution back. Both
//! contributions are computed (and every account and tax table resolved)
//! before the first split is touched, so a failing change leaves the ledger
//! untouched.

use rust_decimal::Decimal;
use tracing::debug;

use core_kernel::{AccountId, DocumentId, EntryId, Money, TaxTableId};

use crate::document::{Document, Entry, EntryDraft, EntrySide, EntryTerms};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{ChangeField, EntityRef};
use crate::posting::{
    ensure_account_currency, ensure_modifiable, ensure_posting_headroom, entry_contribution,
    prune_posting_splits, update_posting_splits, Contribution,
};
use crate::store::EntityStore;
use crate::tax::TaxFallback;

/// A single field change on an entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryChange {
    Taxable(bool),
    TaxTable(Option<TaxTableId>),
    Price(Money),
    Quantity(Decimal),
    /// Book account; `None` books against the document's default
    Account(Option<AccountId>),
    Description(String),
}

impl EntryChange {
    fn field_name(&self) -> &'static str {
        match self {
            EntryChange::Taxable(_) => "taxable",
            EntryChange::TaxTable(_) => "tax_table",
            EntryChange::Price(_) => "price",
            EntryChange::Quantity(_) => "quantity",
            EntryChange::Account(_) => "account",
            EntryChange::Description(_) => "description",
        }
    }

    fn apply(self, entry: &mut Entry) {
        match self {
            EntryChange::Taxable(taxable) => entry.terms.taxable = taxable,
            EntryChange::TaxTable(table) => entry.terms.tax_table_id = table,
            EntryChange::Price(price) => entry.terms.price = price,
            EntryChange::Quantity(quantity) => entry.quantity = quantity,
            EntryChange::Account(account) => entry.terms.account_id = account,
            EntryChange::Description(description) => entry.description = description,
        }
    }
}

fn ensure_side(document: &Document, side: EntrySide) -> LedgerResult<()> {
    if side != document.side {
        return Err(LedgerError::wrong_document_type(document.side, side));
    }
    Ok(())
}

/// Field checks that do not depend on the posting state
fn validate_terms(store: &EntityStore, document: &Document, terms: &EntryTerms) -> LedgerResult<()> {
    if terms.price.currency() != document.currency {
        return Err(LedgerError::invalid(format!(
            "price in {} for a document in {}",
            terms.price.currency(),
            document.currency
        )));
    }
    if let Some(account) = terms.account_id {
        ensure_account_currency(store, account, document.currency)?;
    }
    if let Some(table) = terms.tax_table_id {
        store.tax_table(table)?;
    }
    Ok(())
}

/// Adds an entry to a document
///
/// # Errors
///
/// - `NotModifiable` if the document has payments
/// - `WrongDocumentType` if `side` is not the document's active side
/// - `InvalidArgument` / `AccountNotFound` / `TaxTableNotFound` for bad terms
pub fn create_entry(
    store: &mut EntityStore,
    document_id: DocumentId,
    side: EntrySide,
    draft: EntryDraft,
    fallback: TaxFallback,
) -> LedgerResult<EntryId> {
    ensure_modifiable(store, document_id)?;
    let document = store.document(document_id)?.clone();
    ensure_side(&document, side)?;

    let entry = Entry {
        id: store.next_id(),
        document_id,
        side,
        description: draft.description,
        date: draft.date,
        quantity: draft.quantity,
        terms: EntryTerms {
            account_id: draft.account_id,
            price: draft.price,
            taxable: draft.taxable,
            tax_table_id: draft.tax_table_id,
        },
    };
    validate_terms(store, &document, &entry.terms)?;
    let contribution = entry_contribution(store, &document, &entry, fallback)?;
    ensure_posting_headroom(store, &document, contribution.as_slice())?;

    if let Some(contribution) = &contribution {
        update_posting_splits(store, &document, contribution)?;
    }
    let id = store.insert_entry(entry);
    store.document_mut(document_id)?.entries.push(id);
    store.changed(EntityRef::Document(document_id), ChangeField::Entries);
    prune_posting_splits(store, &document)?;

    debug!(document = %document.number, entry = %id, "Created entry");
    Ok(id)
}

/// Changes one field of an entry through subtract, mutate, re-add
///
/// # Errors
///
/// As [`create_entry`]; additionally `EntryNotFound`.
pub fn change_entry(
    store: &mut EntityStore,
    entry_id: EntryId,
    side: EntrySide,
    change: EntryChange,
    fallback: TaxFallback,
) -> LedgerResult<()> {
    let entry = store.entry(entry_id)?.clone();
    ensure_modifiable(store, entry.document_id)?;
    let document = store.document(entry.document_id)?.clone();
    ensure_side(&document, side)?;

    let field = change.field_name();
    let mut updated = entry.clone();
    change.apply(&mut updated);
    validate_terms(store, &document, &updated.terms)?;

    let before = entry_contribution(store, &document, &entry, fallback)?;
    let after = entry_contribution(store, &document, &updated, fallback)?;
    let replay: Vec<Contribution> = before
        .iter()
        .map(Contribution::negated)
        .chain(after)
        .collect();
    ensure_posting_headroom(store, &document, &replay)?;

    if let Some(before) = &before {
        update_posting_splits(store, &document, &before.negated())?;
    }
    *store.entry_mut(entry_id)? = updated;
    store.changed(EntityRef::Entry(entry_id), ChangeField::Attributes);
    if let Some(after) = &after {
        update_posting_splits(store, &document, after)?;
    }
    prune_posting_splits(store, &document)?;

    debug!(document = %document.number, entry = %entry_id, field, "Changed entry");
    Ok(())
}

/// Removes an entry and its contribution
pub fn remove_entry(store: &mut EntityStore, entry_id: EntryId, fallback: TaxFallback) -> LedgerResult<()> {
    let entry = store.entry(entry_id)?.clone();
    ensure_modifiable(store, entry.document_id)?;
    let document = store.document(entry.document_id)?.clone();

    let before = entry_contribution(store, &document, &entry, fallback)?.map(|c| c.negated());
    ensure_posting_headroom(store, &document, before.as_slice())?;
    if let Some(before) = &before {
        update_posting_splits(store, &document, before)?;
    }
    store.drop_entry(entry_id);
    store.document_mut(document.id)?.entries.retain(|e| *e != entry_id);
    store.changed(EntityRef::Document(document.id), ChangeField::Entries);
    prune_posting_splits(store, &document)?;

    debug!(document = %document.number, entry = %entry_id, "Removed entry");
    Ok(())
}
