//! Ledger configuration

use serde::Deserialize;

use core_kernel::{Currency, Timezone};

use crate::tax::TaxFallback;

/// Ledger configuration
///
/// Every field has a default, so an empty environment yields a working
/// ledger.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Currency of the root account and of new ledgers' defaults
    pub default_currency: Currency,
    /// Time zone that decides which calendar day is "today"
    pub timezone: Timezone,
    /// Whether taxable entries without a table use the first available one
    pub tax_table_fallback: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: Currency::USD,
            timezone: Timezone::default(),
            tax_table_fallback: true,
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from `LEDGER_*` environment variables
    ///
    /// # Example
    ///
    /// ```bash
    /// LEDGER_DEFAULT_CURRENCY=EUR LEDGER_TIMEZONE=Europe/Berlin
    /// ```
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Loads a `.env` file if present, then the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn tax_fallback(&self) -> TaxFallback {
        if self.tax_table_fallback {
            TaxFallback::FirstAvailable
        } else {
            TaxFallback::Disabled
        }
    }
}
