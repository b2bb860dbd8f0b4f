//! Test Data Builders
//!
//! Provides builders for ledgers pre-loaded with a small chart of accounts
//! and a VAT table, plus entry drafts with sensible defaults. Tests only
//! specify what they care about.

use chrono::NaiveDate;
use core_kernel::{
    AccountId, Currency, DocumentId, FixedClock, Money, SequentialIdSource, TaxTableId,
    TransactionId,
};
use domain_ledger::{
    AccountType, DocumentKind, EntryDraft, Ledger, LedgerConfig, NewDocument, Owner,
    OwnerKind, PostRequest, TaxTableEntry,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{DateFixtures, IdFixtures, MoneyFixtures, RateFixtures, StringFixtures};

/// Accounts every fixture ledger carries
#[derive(Debug, Clone, Copy)]
pub struct StandardAccounts {
    pub bank: AccountId,
    pub receivable: AccountId,
    pub payable: AccountId,
    pub income: AccountId,
    pub expense: AccountId,
    pub tax_payable: AccountId,
}

/// A ledger with its standard accounts and VAT table
#[derive(Debug)]
pub struct LedgerFixture {
    pub ledger: Ledger,
    pub accounts: StandardAccounts,
    pub vat_table: TaxTableId,
}

/// Builder for fixture ledgers
pub struct TestLedgerBuilder {
    currency: Currency,
    today: NaiveDate,
    vat_percent: Decimal,
    tax_table_fallback: bool,
}

impl Default for TestLedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLedgerBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        Self {
            currency: Currency::EUR,
            today: DateFixtures::today(),
            vat_percent: RateFixtures::vat_percent(),
            tax_table_fallback: true,
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Sets the date the fixed clock reports
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_vat_percent(mut self, percent: Decimal) -> Self {
        self.vat_percent = percent;
        self
    }

    pub fn with_tax_table_fallback(mut self, enabled: bool) -> Self {
        self.tax_table_fallback = enabled;
        self
    }

    /// Builds the ledger
    ///
    /// # Panics
    ///
    /// Panics if the chart of accounts cannot be created.
    pub fn build(self) -> LedgerFixture {
        let config = LedgerConfig {
            default_currency: self.currency,
            tax_table_fallback: self.tax_table_fallback,
            ..LedgerConfig::default()
        };
        let mut ledger = Ledger::builder()
            .with_config(config)
            .with_clock(FixedClock(self.today))
            .with_id_source(SequentialIdSource::new())
            .build();

        let c = self.currency;
        let mut add = |code: &str, name: &str, account_type: AccountType| {
            ledger
                .create_account(code, name, account_type, c, None)
                .expect("fixture account")
        };
        let accounts = StandardAccounts {
            bank: add("1000", "Bank", AccountType::Bank),
            receivable: add("1200", "Accounts Receivable", AccountType::Receivable),
            payable: add("2000", "Accounts Payable", AccountType::Payable),
            tax_payable: add("2200", "VAT Payable", AccountType::Liability),
            income: add("4000", "Sales", AccountType::Income),
            expense: add("6000", "Purchases", AccountType::Expense),
        };
        let vat_table = ledger
            .add_tax_table("VAT", vec![TaxTableEntry::percent(accounts.tax_payable, self.vat_percent)])
            .expect("fixture tax table");

        LedgerFixture {
            ledger,
            accounts,
            vat_table,
        }
    }
}

impl LedgerFixture {
    pub fn currency(&self) -> Currency {
        self.ledger.config().default_currency
    }

    /// Opens a customer invoice
    pub fn customer_invoice(&mut self, number: &str) -> DocumentId {
        let currency = self.currency();
        self.ledger
            .open_document(NewDocument::new(
                DocumentKind::CustomerInvoice,
                Owner::Customer(IdFixtures::customer_id()),
                number,
                currency,
                DateFixtures::invoice_date(),
            ))
            .expect("open invoice")
    }

    /// Opens a vendor bill
    pub fn vendor_bill(&mut self, number: &str) -> DocumentId {
        let currency = self.currency();
        self.ledger
            .open_document(NewDocument::new(
                DocumentKind::VendorBill,
                Owner::Vendor(IdFixtures::vendor_id()),
                number,
                currency,
                DateFixtures::invoice_date(),
            ))
            .expect("open bill")
    }

    /// Request posting an invoice to receivables and sales
    pub fn invoice_post_request(&self) -> PostRequest {
        PostRequest {
            owner_kind: OwnerKind::Customer,
            post_account: self.accounts.receivable,
            book_account: self.accounts.income,
            post_date: DateFixtures::invoice_date(),
            due_date: DateFixtures::due_date(),
            memo: None,
        }
    }

    /// Request posting a bill to payables and purchases
    pub fn bill_post_request(&self) -> PostRequest {
        PostRequest {
            owner_kind: OwnerKind::Vendor,
            post_account: self.accounts.payable,
            book_account: self.accounts.expense,
            post_date: DateFixtures::invoice_date(),
            due_date: DateFixtures::due_date(),
            memo: None,
        }
    }

    pub fn post_invoice(&mut self, document: DocumentId) -> TransactionId {
        let request = self.invoice_post_request();
        self.ledger.post(document, &request).expect("post invoice")
    }

    /// Opens and posts an empty invoice with the default number
    pub fn posted_invoice(&mut self) -> DocumentId {
        let document = self.customer_invoice(StringFixtures::invoice_number());
        self.post_invoice(document);
        document
    }

    pub fn posting_transaction(&self, document: DocumentId) -> TransactionId {
        self.ledger
            .store()
            .document(document)
            .expect("document")
            .posting_transaction()
            .expect("posted document")
    }
}

/// Builder for entry drafts
pub struct TestEntryBuilder {
    description: String,
    date: NaiveDate,
    quantity: Decimal,
    price: Money,
    account: Option<AccountId>,
    taxable: bool,
    tax_table: Option<TaxTableId>,
}

impl Default for TestEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEntryBuilder {
    /// Three units at 12.50 EUR, untaxed
    pub fn new() -> Self {
        Self {
            description: "Consulting".to_string(),
            date: DateFixtures::invoice_date(),
            quantity: dec!(3),
            price: MoneyFixtures::eur_unit_price(),
            account: None,
            taxable: false,
            tax_table: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = price;
        self
    }

    pub fn with_account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }

    /// Taxed with `table`
    pub fn taxed_with(mut self, table: TaxTableId) -> Self {
        self.taxable = true;
        self.tax_table = Some(table);
        self
    }

    /// Taxed through the fallback table
    pub fn taxed(mut self) -> Self {
        self.taxable = true;
        self.tax_table = None;
        self
    }

    pub fn build(self) -> EntryDraft {
        let mut draft = EntryDraft::new(self.description, self.date, self.quantity, self.price);
        draft.account_id = self.account;
        draft.taxable = self.taxable;
        draft.tax_table_id = self.tax_table;
        draft
    }
}
