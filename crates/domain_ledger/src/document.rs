//! Business documents and their entries
//!
//! Customer invoices, vendor bills, employee vouchers and job invoices share
//! one `Document` type. What differs between them (which entry side is
//! active, which action tag the posting splits carry, whether the post
//! account is a receivable or a payable) is captured by [`EntrySide`] and its
//! [`SideProfile`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{
    AccountId, Currency, CustomerId, DocumentId, EmployeeId, EntryId, JobId, LotId, Money,
    TaxTableId, TransactionId, VendorId,
};

use crate::account::AccountType;
use crate::transaction::SplitAction;

/// Kind of party a document is issued to or received from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Customer,
    Vendor,
    Employee,
    Job,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OwnerKind::Customer => "customer",
            OwnerKind::Vendor => "vendor",
            OwnerKind::Employee => "employee",
            OwnerKind::Job => "job",
        };
        f.write_str(name)
    }
}

/// Owner of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Customer(CustomerId),
    Vendor(VendorId),
    Employee(EmployeeId),
    Job(JobId),
}

impl Owner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            Owner::Customer(_) => OwnerKind::Customer,
            Owner::Vendor(_) => OwnerKind::Vendor,
            Owner::Employee(_) => OwnerKind::Employee,
            Owner::Job(_) => OwnerKind::Job,
        }
    }
}

/// The party a job is run for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobOwner {
    Customer(CustomerId),
    Vendor(VendorId),
}

impl JobOwner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            JobOwner::Customer(_) => OwnerKind::Customer,
            JobOwner::Vendor(_) => OwnerKind::Vendor,
        }
    }
}

/// A job groups documents for one customer or vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub number: String,
    pub name: String,
    pub owner: JobOwner,
    pub active: bool,
}

impl Job {
    pub fn new(id: JobId, number: impl Into<String>, name: impl Into<String>, owner: JobOwner) -> Self {
        Self {
            id,
            number: number.into(),
            name: name.into(),
            owner,
            active: true,
        }
    }
}

/// Which set of entry terms is active for a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntrySide {
    Invoice,
    Bill,
    Voucher,
}

/// Per-side behavior table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideProfile {
    /// Action tag on posting splits
    pub action: SplitAction,
    /// Account type the post account must have
    pub post_account_type: AccountType,
    pub label: &'static str,
}

impl EntrySide {
    /// Side for a direct (non-job) owner kind; `None` for `Job`, which has
    /// to be resolved through the job's own owner
    pub fn for_owner_kind(kind: OwnerKind) -> Option<Self> {
        match kind {
            OwnerKind::Customer => Some(EntrySide::Invoice),
            OwnerKind::Vendor => Some(EntrySide::Bill),
            OwnerKind::Employee => Some(EntrySide::Voucher),
            OwnerKind::Job => None,
        }
    }

    pub fn profile(&self) -> SideProfile {
        match self {
            EntrySide::Invoice => SideProfile {
                action: SplitAction::Invoice,
                post_account_type: AccountType::Receivable,
                label: "invoice",
            },
            EntrySide::Bill => SideProfile {
                action: SplitAction::Bill,
                post_account_type: AccountType::Payable,
                label: "bill",
            },
            EntrySide::Voucher => SideProfile {
                action: SplitAction::Voucher,
                post_account_type: AccountType::Payable,
                label: "voucher",
            },
        }
    }
}

impl fmt::Display for EntrySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().label)
    }
}

/// What kind of document this is; fixes the accepted owner kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    CustomerInvoice,
    VendorBill,
    EmployeeVoucher,
    JobInvoice,
}

impl DocumentKind {
    pub fn owner_kind(&self) -> OwnerKind {
        match self {
            DocumentKind::CustomerInvoice => OwnerKind::Customer,
            DocumentKind::VendorBill => OwnerKind::Vendor,
            DocumentKind::EmployeeVoucher => OwnerKind::Employee,
            DocumentKind::JobInvoice => OwnerKind::Job,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::CustomerInvoice => "customer invoice",
            DocumentKind::VendorBill => "vendor bill",
            DocumentKind::EmployeeVoucher => "employee voucher",
            DocumentKind::JobInvoice => "job invoice",
        };
        f.write_str(name)
    }
}

/// Link between a posted document and the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRecord {
    pub transaction_id: TransactionId,
    pub lot_id: LotId,
    /// Receivable/payable account
    pub post_account: AccountId,
    /// Book account for entries that do not name their own
    pub book_account: AccountId,
    pub date_posted: NaiveDate,
    pub date_due: NaiveDate,
}

/// An invoice, bill, voucher or job invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Human-readable number
    pub number: String,
    pub kind: DocumentKind,
    pub owner: Owner,
    /// Active entry side, resolved from the owner
    pub side: EntrySide,
    pub currency: Currency,
    /// Entries in insertion order
    pub entries: Vec<EntryId>,
    pub date_opened: NaiveDate,
    pub notes: Option<String>,
    /// Present once posted
    pub posting: Option<PostingRecord>,
}

impl Document {
    pub fn is_posted(&self) -> bool {
        self.posting.is_some()
    }

    pub fn posting_transaction(&self) -> Option<TransactionId> {
        self.posting.as_ref().map(|p| p.transaction_id)
    }

    pub fn posting_lot(&self) -> Option<LotId> {
        self.posting.as_ref().map(|p| p.lot_id)
    }
}

/// Pricing terms of one entry side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTerms {
    /// Income/expense account; falls back to the document's book account
    pub account_id: Option<AccountId>,
    pub price: Money,
    pub taxable: bool,
    pub tax_table_id: Option<TaxTableId>,
}

/// One line of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub document_id: DocumentId,
    pub side: EntrySide,
    pub description: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub terms: EntryTerms,
}

/// Input for creating an entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub description: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub price: Money,
    pub account_id: Option<AccountId>,
    pub taxable: bool,
    pub tax_table_id: Option<TaxTableId>,
}

impl EntryDraft {
    pub fn new(description: impl Into<String>, date: NaiveDate, quantity: Decimal, price: Money) -> Self {
        Self {
            description: description.into(),
            date,
            quantity,
            price,
            account_id: None,
            taxable: false,
            tax_table_id: None,
        }
    }

    pub fn booked_to(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Marks the entry taxable; `None` defers to the fallback table
    pub fn taxed(mut self, tax_table_id: Option<TaxTableId>) -> Self {
        self.taxable = true;
        self.tax_table_id = tax_table_id;
        self
    }
}

/// Sums over all entries of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTotals {
    pub total_excl_tax: Money,
    pub total_incl_tax: Money,
}

impl DocumentTotals {
    pub fn total_tax(&self) -> Money {
        self.total_incl_tax - self.total_excl_tax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_table() {
        assert_eq!(EntrySide::for_owner_kind(OwnerKind::Customer), Some(EntrySide::Invoice));
        assert_eq!(EntrySide::for_owner_kind(OwnerKind::Vendor), Some(EntrySide::Bill));
        assert_eq!(EntrySide::for_owner_kind(OwnerKind::Employee), Some(EntrySide::Voucher));
        assert_eq!(EntrySide::for_owner_kind(OwnerKind::Job), None);

        assert_eq!(EntrySide::Invoice.profile().post_account_type, AccountType::Receivable);
        assert_eq!(EntrySide::Voucher.profile().action, SplitAction::Voucher);
    }

    #[test]
    fn test_document_kind_owner() {
        assert_eq!(DocumentKind::JobInvoice.owner_kind(), OwnerKind::Job);
        assert_eq!(Owner::Vendor(VendorId::new_v7()).kind(), OwnerKind::Vendor);
    }
}
