//! Ledger Domain - Double-Entry Entity Store and Document Posting
//!
//! This crate keeps a double-entry ledger consistent while business documents
//! (customer invoices, vendor bills, employee vouchers, job invoices) are
//! posted to it and edited afterwards.
//!
//! # Consistency Rules
//!
//! - The split values of every transaction sum to exactly zero; splits are
//!   only created and adjusted in balanced pairs
//! - A posted document is realized by one posting transaction and one lot on
//!   its receivable/payable account
//! - Entry changes are applied as subtract, mutate, re-add
//! - Once a payment touches a document's lot the document is frozen
//! - Memoized balances are dropped as soon as a split they depend on changes
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{Ledger, LedgerConfig, NewDocument, PostRequest};
//!
//! let mut ledger = Ledger::new(LedgerConfig::load()?);
//!
//! let invoice = ledger.open_document(NewDocument::new(
//!     DocumentKind::CustomerInvoice,
//!     Owner::Customer(customer),
//!     "INV-0001",
//!     Currency::EUR,
//!     today,
//! ))?;
//! ledger.create_entry(invoice, EntrySide::Invoice, draft)?;
//! ledger.post(invoice, &request)?;
//! ```

pub mod account;
pub mod balance;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lot;
pub mod mutation;
pub mod ports;
pub mod posting;
pub mod store;
pub mod tax;
pub mod transaction;

pub use account::{Account, AccountType};
pub use balance::{AccountBalance, BalanceCache, CacheStats};
pub use config::LedgerConfig;
pub use document::{
    Document, DocumentKind, DocumentTotals, Entry, EntryDraft, EntrySide, EntryTerms, Job,
    JobOwner, Owner, OwnerKind, PostingRecord, SideProfile,
};
pub use error::{LedgerError, LedgerResult};
pub use events::{ChangeBus, ChangeEvent, ChangeField, Delivery, EntityRef, Subscriber};
pub use ledger::{CurrencyTotals, Ledger, LedgerBuilder, TrialBalance, TrialBalanceEntry};
pub use lot::Lot;
pub use mutation::EntryChange;
pub use ports::{InMemoryGateway, PersistenceGateway};
pub use posting::{Contribution, NewDocument, PaymentRequest, PostRequest};
pub use store::{EntityGraph, EntityStore};
pub use tax::{TaxAmount, TaxComputation, TaxFallback, TaxTable, TaxTableEntry, TaxTableRepository};
pub use transaction::{Split, SplitAction, SplitDraft, SplitTarget, Transaction};
