//! Core Kernel - Foundational types shared by the ledger crates
//!
//! This crate provides the building blocks every other crate depends on:
//! - Money types with precise decimal arithmetic
//! - Typed identifiers for ledger entities
//! - Ports for identifier generation and calendar access

pub mod money;
pub mod identifiers;
pub mod clock;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError, Rate, LEDGER_SCALE};
pub use identifiers::{
    AccountId, TransactionId, SplitId, LotId, TaxTableId,
    DocumentId, EntryId, JobId, CustomerId, VendorId, EmployeeId,
};
pub use clock::{Clock, FixedClock, SystemClock, Timezone};
pub use ports::{IdSource, PortError, SequentialIdSource, UuidV7Source};
pub use error::CoreError;
