//! Ledger model for tally.
//!
//! An in-memory index of one account's transactions, rebuilt on every run
//! from the source and the sink:
//! - [`Amount`]: a value held in both the minor and the major currency
//! - [`Converter`] / [`RateTable`]: dated exchange rates with nearest-date fallback
//! - [`Account`] → [`Year`] → [`Month`] → [`Day`] → [`Transaction`]: the ledger tree
//! - [`Day::add_transaction`]: the dedup/merge rules applied on every insert

pub mod amount;
pub mod currency;
pub mod error;
pub mod transaction;
pub mod tree;

pub use amount::Amount;
pub use currency::{Converter, RateTable};
pub use error::{LedgerError, LedgerResult};
pub use transaction::Transaction;
pub use tree::{Account, Day, MergeOutcome, Month, Year};
