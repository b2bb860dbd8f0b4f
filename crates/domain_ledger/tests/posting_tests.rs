//! Posting, entry mutation and payment tests for domain_ledger

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, MoneyError};
use domain_ledger::{
    AccountType, DocumentKind, EntryDraft, EntrySide, JobOwner, LedgerError, NewDocument, Owner, OwnerKind,
    PaymentRequest, SplitAction, SplitDraft,
};
use test_utils::*;

fn eur(amount: Decimal) -> Money {
    MoneyFixtures::eur(amount)
}

fn payment(fixture: &LedgerFixture, amount: Decimal) -> PaymentRequest {
    PaymentRequest {
        account: fixture.accounts.bank,
        amount: eur(amount),
        date: DateFixtures::payment_date(),
        memo: Some("Bank transfer".to_string()),
    }
}

// ============================================================================
// Posting Tests
// ============================================================================

mod posting_tests {
    use super::*;

    #[test]
    fn test_taxed_entry_posts_three_splits() {
        init_test_tracing();
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        f.ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().taxed_with(f.vat_table).build())
            .unwrap();

        let tx = f.post_invoice(invoice);
        let store = f.ledger.store();

        assert_eq!(store.transaction(tx).unwrap().splits.len(), 3);
        assert_split_value(store, tx, f.accounts.receivable, dec!(-44.625));
        assert_split_value(store, tx, f.accounts.income, dec!(37.50));
        assert_split_value(store, tx, f.accounts.tax_payable, dec!(7.125));
        assert_transaction_balanced(store, tx);

        let document = store.document(invoice).unwrap();
        let lot = document.posting_lot().unwrap();
        let lot_splits = store.splits_in_lot(lot);
        assert_eq!(lot_splits.len(), 1);
        let post_split = store.split(lot_splits[0]).unwrap();
        assert_eq!(post_split.account_id, f.accounts.receivable);
        assert_eq!(post_split.action, SplitAction::Invoice);
        for split in store.splits_of_transaction(tx).unwrap() {
            let in_lot = split.account_id == f.accounts.receivable;
            assert_eq!(split.lot_id.is_some(), in_lot, "lot reference on {}", split.account_id);
        }
        assert_eq!(store.lot(lot).unwrap().document_id, Some(invoice));
        assert_eq!(store.transaction(tx).unwrap().document_id, Some(invoice));
    }

    #[test]
    fn test_entry_added_after_posting_matches_entry_added_before() {
        let mut before = TestLedgerBuilder::new().build();
        let first = before.customer_invoice("INV-A");
        before
            .ledger
            .create_entry(first, EntrySide::Invoice, TestEntryBuilder::new().taxed_with(before.vat_table).build())
            .unwrap();
        let tx_before = before.post_invoice(first);

        let mut after = TestLedgerBuilder::new().build();
        let second = after.customer_invoice("INV-B");
        let tx_after = after.post_invoice(second);
        after
            .ledger
            .create_entry(second, EntrySide::Invoice, TestEntryBuilder::new().taxed_with(after.vat_table).build())
            .unwrap();

        for (f, tx) in [(&before, tx_before), (&after, tx_after)] {
            let store = f.ledger.store();
            assert_split_value(store, tx, f.accounts.receivable, dec!(-44.625));
            assert_split_value(store, tx, f.accounts.income, dec!(37.50));
            assert_split_value(store, tx, f.accounts.tax_payable, dec!(7.125));
        }
    }

    #[test]
    fn test_single_untaxed_entry_posts_two_splits() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        f.ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().build())
            .unwrap();

        let tx = f.post_invoice(invoice);

        assert_eq!(f.ledger.store().transaction(tx).unwrap().splits.len(), 2);
        assert_split_value(f.ledger.store(), tx, f.accounts.receivable, dec!(-37.50));
        assert_split_value(f.ledger.store(), tx, f.accounts.income, dec!(37.50));
    }

    #[test]
    fn test_entries_share_book_and_tax_splits() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.posted_invoice();
        for quantity in [dec!(1), dec!(2)] {
            let draft = TestEntryBuilder::new()
                .with_quantity(quantity)
                .with_price(MoneyFixtures::eur_100())
                .taxed_with(f.vat_table)
                .build();
            f.ledger.create_entry(invoice, EntrySide::Invoice, draft).unwrap();
        }

        let tx = f.posting_transaction(invoice);
        let store = f.ledger.store();
        assert_eq!(store.transaction(tx).unwrap().splits.len(), 3);
        assert_split_value(store, tx, f.accounts.income, dec!(300));
        assert_split_value(store, tx, f.accounts.tax_payable, dec!(57));
        assert_split_value(store, tx, f.accounts.receivable, dec!(-357));
    }

    #[test]
    fn test_entry_account_overrides_book_account() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.posted_invoice();
        let draft = TestEntryBuilder::new().with_account(f.accounts.expense).build();
        f.ledger.create_entry(invoice, EntrySide::Invoice, draft).unwrap();

        let tx = f.posting_transaction(invoice);
        assert_split_value(f.ledger.store(), tx, f.accounts.expense, dec!(37.50));
        assert_no_split_on(f.ledger.store(), tx, f.accounts.income);
    }

    #[test]
    fn test_prebuilt_draft_and_notes() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f
            .ledger
            .open_document(
                NewDocument::new(
                    DocumentKind::CustomerInvoice,
                    Owner::Customer(IdFixtures::customer_id()),
                    StringFixtures::invoice_number(),
                    Currency::EUR,
                    DateFixtures::invoice_date(),
                )
                .with_notes("Net 30"),
            )
            .unwrap();
        let draft = EntryDraft::new(
            "Travel",
            DateFixtures::invoice_date(),
            dec!(2),
            MoneyFixtures::eur_100(),
        )
        .booked_to(f.accounts.expense)
        .taxed(Some(f.vat_table));
        let entry = f.ledger.create_entry(invoice, EntrySide::Invoice, draft).unwrap();

        let tx = f.post_invoice(invoice);

        assert_eq!(f.ledger.store().document(invoice).unwrap().notes.as_deref(), Some("Net 30"));
        assert_eq!(f.ledger.store().entry(entry).unwrap().description, "Travel");
        assert_split_value(f.ledger.store(), tx, f.accounts.expense, dec!(200));
        assert_split_value(f.ledger.store(), tx, f.accounts.tax_payable, dec!(38));
    }

    #[test]
    fn test_fixture_in_other_currency() {
        let mut f = TestLedgerBuilder::new().with_currency(Currency::USD).build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());

        let eur_priced = f
            .ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().build());
        assert!(matches!(eur_priced, Err(LedgerError::InvalidArgument(_))));

        let draft = TestEntryBuilder::new()
            .with_description("Licence")
            .with_quantity(dec!(1))
            .with_price(MoneyFixtures::usd_100())
            .build();
        let entry = f.ledger.create_entry(invoice, EntrySide::Invoice, draft).unwrap();
        let tx = f.post_invoice(invoice);

        assert_eq!(f.ledger.store().entry(entry).unwrap().description, "Licence");
        assert_split_value(f.ledger.store(), tx, f.accounts.income, dec!(100));
    }

    #[test]
    fn test_second_post_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.posted_invoice();
        let request = f.invoice_post_request();

        let result = f.ledger.post(invoice, &request);

        assert!(matches!(result, Err(LedgerError::AlreadyPosted(_))));
    }

    #[test]
    fn test_owner_kind_mismatch_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        let mut request = f.invoice_post_request();
        request.owner_kind = OwnerKind::Vendor;
        let before = f.ledger.store().snapshot();

        let result = f.ledger.post(invoice, &request);

        assert!(matches!(result, Err(LedgerError::WrongOwnerType { .. })));
        assert_eq!(f.ledger.store().snapshot(), before);
    }

    #[test]
    fn test_due_date_before_post_date_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        let mut request = f.invoice_post_request();
        request.due_date = request.post_date.pred_opt().unwrap();

        assert!(matches!(f.ledger.post(invoice, &request), Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn test_book_account_in_other_currency_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let usd_income = f
            .ledger
            .create_account("4100", "Export sales", AccountType::Income, Currency::USD, None)
            .unwrap();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        let mut request = f.invoice_post_request();
        request.book_account = usd_income;

        assert!(matches!(f.ledger.post(invoice, &request), Err(LedgerError::InvalidArgument(_))));
        assert!(!f.ledger.store().document(invoice).unwrap().is_posted());
    }

    #[test]
    fn test_fallback_table_applies_to_taxable_entry_without_table() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.posted_invoice();
        f.ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().taxed().build())
            .unwrap();

        let tx = f.posting_transaction(invoice);
        assert_split_value(f.ledger.store(), tx, f.accounts.tax_payable, dec!(7.125));
    }

    #[test]
    fn test_disabled_fallback_rejects_taxable_entry_without_table() {
        let mut f = TestLedgerBuilder::new().with_tax_table_fallback(false).build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        f.ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().build())
            .unwrap();
        let entry = f.ledger.store().document(invoice).unwrap().entries[0];

        let result = f.ledger.set_taxable(entry, EntrySide::Invoice, true);

        assert!(matches!(result, Err(LedgerError::TaxTableNotFound(_))));
        assert!(!f.ledger.store().entry(entry).unwrap().terms.taxable);
    }

    #[test]
    fn test_vendor_bill_uses_bill_side() {
        let mut f = TestLedgerBuilder::new().build();
        let bill = f.vendor_bill(StringFixtures::bill_number());

        let wrong = f
            .ledger
            .create_entry(bill, EntrySide::Invoice, TestEntryBuilder::new().build());
        assert!(matches!(wrong, Err(LedgerError::WrongDocumentType { .. })));

        f.ledger
            .create_entry(bill, EntrySide::Bill, TestEntryBuilder::new().build())
            .unwrap();
        let request = f.bill_post_request();
        let tx = f.ledger.post(bill, &request).unwrap();

        assert_split_value(f.ledger.store(), tx, f.accounts.payable, dec!(-37.50));
        assert_split_value(f.ledger.store(), tx, f.accounts.expense, dec!(37.50));
        let splits = f.ledger.store().splits_of_transaction(tx).unwrap();
        assert!(splits.iter().all(|s| s.action == SplitAction::Bill));
    }

    #[test]
    fn test_employee_voucher_uses_voucher_side() {
        let mut f = TestLedgerBuilder::new().build();
        let voucher = f
            .ledger
            .open_document(NewDocument::new(
                DocumentKind::EmployeeVoucher,
                Owner::Employee(IdFixtures::employee_id()),
                StringFixtures::voucher_number(),
                Currency::EUR,
                DateFixtures::invoice_date(),
            ))
            .unwrap();

        assert_eq!(f.ledger.store().document(voucher).unwrap().side, EntrySide::Voucher);
        assert_eq!(EntrySide::Voucher.profile().action, SplitAction::Voucher);
    }

    #[test]
    fn test_document_kind_must_match_owner() {
        let mut f = TestLedgerBuilder::new().build();
        let result = f.ledger.open_document(NewDocument::new(
            DocumentKind::CustomerInvoice,
            Owner::Vendor(IdFixtures::vendor_id()),
            StringFixtures::invoice_number(),
            Currency::EUR,
            DateFixtures::invoice_date(),
        ));
        assert!(matches!(result, Err(LedgerError::WrongOwnerType { .. })));
    }
}

// ============================================================================
// Job Tests
// ============================================================================

mod job_tests {
    use super::*;

    #[test]
    fn test_job_side_follows_underlying_owner() {
        let mut f = TestLedgerBuilder::new().build();
        let vendor_job = f
            .ledger
            .add_job("J-001", "Office fit-out", JobOwner::Vendor(IdFixtures::vendor_id()))
            .unwrap();
        let customer_job = f
            .ledger
            .add_job("J-002", "Website", JobOwner::Customer(IdFixtures::customer_id()))
            .unwrap();

        let open = |f: &mut LedgerFixture, job, number: &str| {
            f.ledger
                .open_document(NewDocument::new(
                    DocumentKind::JobInvoice,
                    Owner::Job(job),
                    number,
                    Currency::EUR,
                    DateFixtures::invoice_date(),
                ))
                .unwrap()
        };
        let bill_like = open(&mut f, vendor_job, "JOB-1");
        let invoice_like = open(&mut f, customer_job, "JOB-2");

        assert_eq!(f.ledger.store().document(bill_like).unwrap().side, EntrySide::Bill);
        assert_eq!(f.ledger.store().document(invoice_like).unwrap().side, EntrySide::Invoice);
    }

    #[test]
    fn test_job_document_posts_as_job_owner_kind() {
        let mut f = TestLedgerBuilder::new().build();
        let job = f
            .ledger
            .add_job("J-001", "Office fit-out", JobOwner::Vendor(IdFixtures::vendor_id()))
            .unwrap();
        let document = f
            .ledger
            .open_document(NewDocument::new(
                DocumentKind::JobInvoice,
                Owner::Job(job),
                "JOB-1",
                Currency::EUR,
                DateFixtures::invoice_date(),
            ))
            .unwrap();
        f.ledger
            .create_entry(document, EntrySide::Bill, TestEntryBuilder::new().build())
            .unwrap();

        let mut request = f.bill_post_request();
        request.owner_kind = OwnerKind::Customer;
        assert!(matches!(
            f.ledger.post(document, &request),
            Err(LedgerError::WrongOwnerType { .. })
        ));

        request.owner_kind = OwnerKind::Vendor;
        let tx = f.ledger.post(document, &request).unwrap();
        assert_split_value(f.ledger.store(), tx, f.accounts.payable, dec!(-37.50));
    }

    #[test]
    fn test_side_cannot_change_once_entries_exist() {
        let mut f = TestLedgerBuilder::new().build();
        let vendor_job = f
            .ledger
            .add_job("J-001", "Fit-out", JobOwner::Vendor(IdFixtures::vendor_id()))
            .unwrap();
        let customer_job = f
            .ledger
            .add_job("J-002", "Website", JobOwner::Customer(IdFixtures::customer_id()))
            .unwrap();
        let document = f
            .ledger
            .open_document(NewDocument::new(
                DocumentKind::JobInvoice,
                Owner::Job(vendor_job),
                "JOB-1",
                Currency::EUR,
                DateFixtures::invoice_date(),
            ))
            .unwrap();

        f.ledger.set_owner(document, Owner::Job(customer_job)).unwrap();
        assert_eq!(f.ledger.store().document(document).unwrap().side, EntrySide::Invoice);

        f.ledger
            .create_entry(document, EntrySide::Invoice, TestEntryBuilder::new().build())
            .unwrap();
        assert!(matches!(
            f.ledger.set_owner(document, Owner::Job(vendor_job)),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.ledger.set_owner(document, Owner::Customer(IdFixtures::customer_id())),
            Err(LedgerError::WrongOwnerType { .. })
        ));
    }
}

// ============================================================================
// Entry Mutation Tests
// ============================================================================

mod mutation_tests {
    use super::*;

    fn taxed_invoice(f: &mut LedgerFixture) -> (core_kernel::DocumentId, core_kernel::EntryId) {
        let invoice = f.posted_invoice();
        let entry = f
            .ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().taxed_with(f.vat_table).build())
            .unwrap();
        (invoice, entry)
    }

    #[test]
    fn test_taxable_false_drops_tax_split() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = taxed_invoice(&mut f);

        f.ledger.set_taxable(entry, EntrySide::Invoice, false).unwrap();

        let tx = f.posting_transaction(invoice);
        let store = f.ledger.store();
        assert_split_value(store, tx, f.accounts.receivable, dec!(-37.50));
        assert_split_value(store, tx, f.accounts.income, dec!(37.50));
        assert_no_split_on(store, tx, f.accounts.tax_payable);
        let lot = store.document(invoice).unwrap().posting_lot().unwrap();
        assert_eq!(store.split(store.splits_in_lot(lot)[0]).unwrap().value, eur(dec!(-37.50)));
    }

    #[test]
    fn test_unchanged_field_round_trips_exactly() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = taxed_invoice(&mut f);
        let tx = f.posting_transaction(invoice);
        let before: Vec<_> = f
            .ledger
            .store()
            .splits_of_transaction(tx)
            .unwrap()
            .into_iter()
            .cloned()
            .collect();

        f.ledger
            .set_price(entry, EntrySide::Invoice, MoneyFixtures::eur_unit_price())
            .unwrap();
        f.ledger.set_entry_description(entry, "Consulting, March").unwrap();

        let after: Vec<_> = f
            .ledger
            .store()
            .splits_of_transaction(tx)
            .unwrap()
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_quantity_change_scales_all_splits() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = taxed_invoice(&mut f);

        f.ledger.set_quantity(entry, dec!(6)).unwrap();

        let tx = f.posting_transaction(invoice);
        assert_split_value(f.ledger.store(), tx, f.accounts.receivable, dec!(-89.25));
        assert_split_value(f.ledger.store(), tx, f.accounts.income, dec!(75));
        assert_split_value(f.ledger.store(), tx, f.accounts.tax_payable, dec!(14.25));
    }

    #[test]
    fn test_switching_tax_table() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = taxed_invoice(&mut f);
        let reduced = f
            .ledger
            .add_tax_table(
                "VAT reduced",
                vec![domain_ledger::TaxTableEntry::percent(
                    f.accounts.tax_payable,
                    RateFixtures::reduced_vat_percent(),
                )],
            )
            .unwrap();

        f.ledger.set_tax_table(entry, EntrySide::Invoice, Some(reduced)).unwrap();

        let tx = f.posting_transaction(invoice);
        assert_split_value(f.ledger.store(), tx, f.accounts.tax_payable, dec!(2.625));
        assert_split_value(f.ledger.store(), tx, f.accounts.receivable, dec!(-40.125));
        assert!(matches!(
            f.ledger.remove_tax_table(reduced),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rebooking_entry_moves_net_sum() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = taxed_invoice(&mut f);

        f.ledger
            .set_entry_account(entry, EntrySide::Invoice, Some(f.accounts.expense))
            .unwrap();

        let tx = f.posting_transaction(invoice);
        assert_no_split_on(f.ledger.store(), tx, f.accounts.income);
        assert_split_value(f.ledger.store(), tx, f.accounts.expense, dec!(37.50));
        assert_split_value(f.ledger.store(), tx, f.accounts.tax_payable, dec!(7.125));
    }

    #[test]
    fn test_wrong_side_leaves_ledger_unchanged() {
        let mut f = TestLedgerBuilder::new().build();
        let (_, entry) = taxed_invoice(&mut f);
        let before = f.ledger.store().snapshot();

        let result = f.ledger.set_taxable(entry, EntrySide::Bill, false);

        assert!(matches!(result, Err(LedgerError::WrongDocumentType { .. })));
        assert_eq!(f.ledger.store().snapshot(), before);
    }

    #[test]
    fn test_price_in_other_currency_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let (_, entry) = taxed_invoice(&mut f);

        let result = f.ledger.set_price(entry, EntrySide::Invoice, MoneyFixtures::usd_100());

        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn test_overflowing_quantity_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.posted_invoice();
        let before = f.ledger.store().snapshot();

        let result = f.ledger.create_entry(
            invoice,
            EntrySide::Invoice,
            TestEntryBuilder::new()
                .with_quantity(Decimal::MAX)
                .with_price(eur(dec!(10)))
                .build(),
        );

        assert!(matches!(result, Err(LedgerError::Money(MoneyError::Overflow))));
        assert_eq!(f.ledger.store().snapshot(), before);
    }

    #[test]
    fn test_entry_overflowing_posting_split_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.posted_invoice();
        let large = f
            .ledger
            .create_entry(
                invoice,
                EntrySide::Invoice,
                TestEntryBuilder::new()
                    .with_quantity(Decimal::MAX)
                    .with_price(eur(dec!(1)))
                    .build(),
            )
            .unwrap();
        let small = f
            .ledger
            .create_entry(
                invoice,
                EntrySide::Invoice,
                TestEntryBuilder::new().with_quantity(dec!(-1)).with_price(eur(dec!(1))).build(),
            )
            .unwrap();
        let before = f.ledger.store().snapshot();

        let added = f.ledger.create_entry(
            invoice,
            EntrySide::Invoice,
            TestEntryBuilder::new().with_quantity(dec!(2)).with_price(eur(dec!(1))).build(),
        );
        assert!(matches!(added, Err(LedgerError::Money(MoneyError::Overflow))));
        assert!(matches!(
            f.ledger.set_quantity(small, dec!(1)),
            Err(LedgerError::Money(MoneyError::Overflow))
        ));
        assert_eq!(f.ledger.store().snapshot(), before);

        f.ledger.remove_entry(large).unwrap();
        assert_eq!(f.ledger.amount_due(invoice).unwrap(), eur(dec!(-1)));
    }

    #[test]
    fn test_posting_overflowing_totals_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        for quantity in [Decimal::MAX, dec!(1)] {
            f.ledger
                .create_entry(
                    invoice,
                    EntrySide::Invoice,
                    TestEntryBuilder::new().with_quantity(quantity).with_price(eur(dec!(1))).build(),
                )
                .unwrap();
        }
        let before = f.ledger.store().snapshot();

        let request = f.invoice_post_request();
        let result = f.ledger.post(invoice, &request);

        assert!(matches!(result, Err(LedgerError::Money(MoneyError::Overflow))));
        assert_eq!(f.ledger.store().snapshot(), before);
    }

    #[test]
    fn test_removing_only_entry_empties_posting() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = taxed_invoice(&mut f);

        f.ledger.remove_entry(entry).unwrap();

        let tx = f.posting_transaction(invoice);
        let store = f.ledger.store();
        assert!(store.transaction(tx).unwrap().splits.is_empty());
        assert!(store.document(invoice).unwrap().entries.is_empty());
        assert_money_zero(&f.ledger.amount_due(invoice).unwrap());

        f.ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().build())
            .unwrap();
        let lot = f.ledger.store().document(invoice).unwrap().posting_lot().unwrap();
        assert_eq!(f.ledger.store().splits_in_lot(lot).len(), 1);
        assert_eq!(f.ledger.amount_due(invoice).unwrap(), eur(dec!(37.50)));
    }

    #[test]
    fn test_totals_follow_entries() {
        let mut f = TestLedgerBuilder::new().build();
        let invoice = f.customer_invoice(StringFixtures::invoice_number());
        f.ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().taxed_with(f.vat_table).build())
            .unwrap();
        f.ledger
            .create_entry(
                invoice,
                EntrySide::Invoice,
                TestEntryBuilder::new().with_quantity(dec!(1)).with_price(MoneyFixtures::eur_100()).build(),
            )
            .unwrap();

        let totals = f.ledger.document_totals(invoice).unwrap();

        assert_eq!(totals.total_excl_tax, eur(dec!(137.50)));
        assert_eq!(totals.total_incl_tax, eur(dec!(144.625)));
        assert_eq!(totals.total_tax(), eur(dec!(7.125)));
        assert_eq!(f.ledger.amount_due(invoice).unwrap(), MoneyFixtures::eur_zero());
    }
}

// ============================================================================
// Payment Tests
// ============================================================================

mod payment_tests {
    use super::*;

    fn invoice_with_entry(f: &mut LedgerFixture) -> (core_kernel::DocumentId, core_kernel::EntryId) {
        let invoice = f.posted_invoice();
        let entry = f
            .ledger
            .create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().taxed_with(f.vat_table).build())
            .unwrap();
        (invoice, entry)
    }

    #[test]
    fn test_partial_payment_reduces_amount_due() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, _) = invoice_with_entry(&mut f);
        assert_eq!(f.ledger.amount_due(invoice).unwrap(), eur(dec!(44.625)));

        let request = payment(&f, dec!(20));
        let tx = f.ledger.pay(invoice, &request).unwrap();

        assert_eq!(f.ledger.amount_due(invoice).unwrap(), eur(dec!(24.625)));
        assert!(!f.ledger.is_paid(invoice).unwrap());
        assert_transaction_balanced(f.ledger.store(), tx);
        assert_split_value(f.ledger.store(), tx, f.accounts.bank, dec!(-20));
    }

    #[test]
    fn test_full_payment_marks_paid() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, _) = invoice_with_entry(&mut f);

        let request = payment(&f, dec!(44.625));
        f.ledger.pay(invoice, &request).unwrap();

        assert!(f.ledger.is_paid(invoice).unwrap());
    }

    #[test]
    fn test_payment_freezes_document() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = invoice_with_entry(&mut f);
        let request = payment(&f, dec!(10));
        f.ledger.pay(invoice, &request).unwrap();
        let before = f.ledger.store().snapshot();

        assert!(!f.ledger.is_modifiable(invoice).unwrap());
        assert!(matches!(
            f.ledger.set_quantity(entry, dec!(1)),
            Err(LedgerError::NotModifiable(_))
        ));
        assert!(matches!(
            f.ledger.create_entry(invoice, EntrySide::Invoice, TestEntryBuilder::new().build()),
            Err(LedgerError::NotModifiable(_))
        ));
        assert!(matches!(f.ledger.remove_entry(entry), Err(LedgerError::NotModifiable(_))));
        assert!(matches!(f.ledger.remove_document(invoice), Err(LedgerError::NotModifiable(_))));
        assert!(matches!(
            f.ledger.set_owner(invoice, Owner::Customer(IdFixtures::customer_id())),
            Err(LedgerError::NotModifiable(_))
        ));
        assert!(matches!(
            f.ledger.set_price(entry, EntrySide::Invoice, eur(dec!(20))),
            Err(LedgerError::NotModifiable(_))
        ));
        assert!(matches!(
            f.ledger.set_taxable(entry, EntrySide::Invoice, false),
            Err(LedgerError::NotModifiable(_))
        ));
        assert!(matches!(
            f.ledger.set_tax_table(entry, EntrySide::Invoice, None),
            Err(LedgerError::NotModifiable(_))
        ));
        assert!(matches!(
            f.ledger.set_entry_account(entry, EntrySide::Invoice, Some(f.accounts.expense)),
            Err(LedgerError::NotModifiable(_))
        ));
        assert!(matches!(
            f.ledger.set_entry_description(entry, "Consulting, revised"),
            Err(LedgerError::NotModifiable(_))
        ));
        assert_eq!(f.ledger.store().snapshot(), before);
    }

    #[test]
    fn test_removing_payment_unfreezes_document() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = invoice_with_entry(&mut f);
        let request = payment(&f, dec!(10));
        let paid = f.ledger.pay(invoice, &request).unwrap();

        f.ledger.remove_transaction(paid).unwrap();

        assert!(f.ledger.is_modifiable(invoice).unwrap());
        f.ledger.set_quantity(entry, dec!(1)).unwrap();
    }

    #[test]
    fn test_invalid_payments_rejected() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, _) = invoice_with_entry(&mut f);

        let too_much = payment(&f, dec!(50));
        assert!(matches!(f.ledger.pay(invoice, &too_much), Err(LedgerError::InvalidArgument(_))));

        let negative = payment(&f, dec!(-5));
        assert!(matches!(f.ledger.pay(invoice, &negative), Err(LedgerError::InvalidArgument(_))));

        let mut foreign = payment(&f, dec!(5));
        foreign.amount = MoneyFixtures::usd_100();
        assert!(matches!(f.ledger.pay(invoice, &foreign), Err(LedgerError::InvalidArgument(_))));

        let unposted = f.customer_invoice("INV-UNPOSTED");
        let request = payment(&f, dec!(5));
        assert!(matches!(f.ledger.pay(unposted, &request), Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn test_lot_split_in_generic_transaction_counts_as_payment() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, _) = invoice_with_entry(&mut f);
        let lot = f.ledger.store().document(invoice).unwrap().posting_lot().unwrap();
        let tx = f
            .ledger
            .create_transaction(Currency::EUR, "Write-off", DateFixtures::payment_date())
            .unwrap();

        f.ledger
            .create_split_pair(
                tx,
                SplitDraft::new(f.accounts.receivable).in_lot(lot),
                SplitDraft::new(f.accounts.expense),
                eur(dec!(44.625)),
            )
            .unwrap();

        assert!(!f.ledger.is_modifiable(invoice).unwrap());
        assert!(f.ledger.is_paid(invoice).unwrap());
    }

    #[test]
    fn test_remove_unpaid_document_removes_posting() {
        let mut f = TestLedgerBuilder::new().build();
        let (invoice, entry) = invoice_with_entry(&mut f);
        let tx = f.posting_transaction(invoice);
        let lot = f.ledger.store().document(invoice).unwrap().posting_lot().unwrap();

        f.ledger.remove_document(invoice).unwrap();

        let store = f.ledger.store();
        assert!(matches!(store.document(invoice), Err(LedgerError::DocumentNotFound(_))));
        assert!(matches!(store.entry(entry), Err(LedgerError::EntryNotFound(_))));
        assert!(matches!(store.transaction(tx), Err(LedgerError::TransactionNotFound(_))));
        assert!(matches!(store.lot(lot), Err(LedgerError::LotNotFound(_))));
        assert!(store.splits_of_account(f.accounts.receivable).is_empty());
    }
}
