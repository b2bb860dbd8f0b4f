//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common ledger values. These fixtures
//! are consistent and predictable so expected split values can be written
//! down exactly.

use chrono::NaiveDate;
use core_kernel::{Currency, CustomerId, EmployeeId, Money, VendorId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// EUR amount from a decimal
    pub fn eur(amount: Decimal) -> Money {
        Money::new(amount, Currency::EUR)
    }

    /// Unit price of the reference invoice line (3 x 12.50)
    pub fn eur_unit_price() -> Money {
        Money::new(dec!(12.50), Currency::EUR)
    }

    pub fn eur_100() -> Money {
        Money::new(dec!(100.00), Currency::EUR)
    }

    pub fn eur_zero() -> Money {
        Money::zero(Currency::EUR)
    }

    /// USD amount for currency mismatch tests
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// Date documents are opened and posted on
    pub fn invoice_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    pub fn due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 14).unwrap()
    }

    pub fn payment_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    /// "Today" as seen by fixture ledgers
    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    /// A date after `today()`
    pub fn future_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    }
}

/// Fixture for tax rates
pub struct RateFixtures;

impl RateFixtures {
    /// Standard VAT rate in percent
    pub fn vat_percent() -> Decimal {
        dec!(19)
    }

    /// Reduced VAT rate in percent
    pub fn reduced_vat_percent() -> Decimal {
        dec!(7)
    }
}

/// Fixture for party identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn customer_id() -> CustomerId {
        CustomerId::new_v7()
    }

    pub fn vendor_id() -> VendorId {
        VendorId::new_v7()
    }

    pub fn employee_id() -> EmployeeId {
        EmployeeId::new_v7()
    }
}

/// Fixture for strings
pub struct StringFixtures;

impl StringFixtures {
    pub fn invoice_number() -> &'static str {
        "INV-000001"
    }

    pub fn bill_number() -> &'static str {
        "BILL-000001"
    }

    pub fn voucher_number() -> &'static str {
        "EXP-000001"
    }
}
