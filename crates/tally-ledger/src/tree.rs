//! The ledger tree: Account → Year → Month → Day → Transaction.
//!
//! Every level keys its children by date component in a `BTreeMap`, so
//! iteration is always in ascending calendar order. Intermediate nodes are
//! created on demand; only [`Day`] applies merge logic.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::amount::Amount;
use crate::transaction::Transaction;

/// What [`Day::add_transaction`] did with an incoming transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// An existing transaction has the same source id; incoming dropped.
    DuplicateSourceId,
    /// An existing transaction has the same sink id; incoming dropped.
    DuplicateSinkId,
    /// Both unidentified with equal minor amount; existing overwritten.
    Replaced,
    /// Existing lacked a source id and matched on amount; id copied over.
    SourceIdLinked,
    /// No match; incoming appended.
    Appended,
}

impl MergeOutcome {
    /// True when the merge left a transaction that must be pushed.
    pub fn changed_existing(&self) -> bool {
        matches!(self, Self::Replaced | Self::SourceIdLinked)
    }
}

/// Transactions for one calendar day, in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Day {
    day: u32,
    transactions: Vec<Transaction>,
}

impl Day {
    pub fn new(day: u32) -> Self {
        Self { day, transactions: Vec::new() }
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Merge `incoming` into this day.
    ///
    /// Rules are tried in priority order, each against the existing
    /// transactions in arrival order; the first hit wins:
    /// 1. same non-empty source id: keep existing as is
    /// 2. same non-empty sink id: keep existing as is
    /// 3. incoming entirely unidentified with equal minor amount: take
    ///    incoming's merchant and amount, mark dirty
    /// 4. existing has no source id, incoming has one, equal minor amount:
    ///    copy the source id, mark dirty
    ///
    /// Otherwise incoming is appended, dirty unless it already has a sink id.
    /// Checking both id rules before either amount rule keeps source and sink
    /// ids unique within the day.
    ///
    /// Rules 3 and 4 use the minor amount as a stand-in key, so an
    /// unidentified transaction lands on the first same-day entry with an
    /// equal amount even when it was a distinct purchase.
    pub fn add_transaction(&mut self, mut incoming: Transaction) -> MergeOutcome {
        if incoming.sink_id().is_none() {
            incoming.dirty = true;
        }

        if let Some(id) = incoming.source_id() {
            if self.transactions.iter().any(|t| t.source_id() == Some(id)) {
                return MergeOutcome::DuplicateSourceId;
            }
        }

        if let Some(id) = incoming.sink_id() {
            if self.transactions.iter().any(|t| t.sink_id() == Some(id)) {
                return MergeOutcome::DuplicateSinkId;
            }
        }

        let key = incoming.amount.minor_units();

        if incoming.is_unidentified() {
            if let Some(existing) = self
                .transactions
                .iter_mut()
                .find(|t| t.amount.minor_units() == key)
            {
                trace!(merchant = %incoming.merchant, "unidentified transaction matched on amount");
                existing.merchant = incoming.merchant;
                existing.amount = incoming.amount;
                existing.dirty = true;
                return MergeOutcome::Replaced;
            }
        }

        if let Some(id) = incoming.source_id() {
            if let Some(existing) = self
                .transactions
                .iter_mut()
                .find(|t| t.source_id().is_none() && t.amount.minor_units() == key)
            {
                trace!(source_id = id, "linking source id to existing transaction");
                existing.source_id = Some(id.to_string());
                existing.dirty = true;
                return MergeOutcome::SourceIdLinked;
            }
        }

        self.transactions.push(incoming);
        MergeOutcome::Appended
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Month {
    month: u32,
    days: BTreeMap<u32, Day>,
}

impl Month {
    pub fn new(month: u32) -> Self {
        Self { month, days: BTreeMap::new() }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self, day: u32) -> Option<&Day> {
        self.days.get(&day)
    }

    pub fn days(&self) -> impl Iterator<Item = &Day> + '_ {
        self.days.values()
    }

    pub fn add_transaction(&mut self, transaction: Transaction) -> MergeOutcome {
        let day = transaction.date.day();
        self.days
            .entry(day)
            .or_insert_with(|| Day::new(day))
            .add_transaction(transaction)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Year {
    year: i32,
    months: BTreeMap<u32, Month>,
}

impl Year {
    pub fn new(year: i32) -> Self {
        Self { year, months: BTreeMap::new() }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self, month: u32) -> Option<&Month> {
        self.months.get(&month)
    }

    pub fn months(&self) -> impl Iterator<Item = &Month> + '_ {
        self.months.values()
    }

    pub fn add_transaction(&mut self, transaction: Transaction) -> MergeOutcome {
        let month = transaction.date.month();
        self.months
            .entry(month)
            .or_insert_with(|| Month::new(month))
            .add_transaction(transaction)
    }
}

/// Root of one account's ledger tree.
///
/// `sink_id` is `None` until the account exists in the sink.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub sink_id: Option<String>,
    pub balance: Option<Amount>,
    years: BTreeMap<i32, Year>,
}

impl Account {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink_id: None,
            balance: None,
            years: BTreeMap::new(),
        }
    }

    pub fn with_sink_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.sink_id = if id.is_empty() { None } else { Some(id) };
        self
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn sink_id(&self) -> Option<&str> {
        self.sink_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn year(&self, year: i32) -> Option<&Year> {
        self.years.get(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = &Year> + '_ {
        self.years.values()
    }

    pub fn month(&self, year: i32, month: u32) -> Option<&Month> {
        self.year(year).and_then(|y| y.month(month))
    }

    pub fn day(&self, year: i32, month: u32, day: u32) -> Option<&Day> {
        self.month(year, month).and_then(|m| m.day(day))
    }

    /// Every `(year, month)` that holds at least one day, ascending.
    pub fn months(&self) -> Vec<(i32, u32)> {
        self.years
            .iter()
            .flat_map(|(year, y)| y.months.keys().map(move |month| (*year, *month)))
            .collect()
    }

    /// All transactions in ascending date order, arrival order within a day.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.years
            .values()
            .flat_map(|y| y.months.values())
            .flat_map(|m| m.days.values())
            .flat_map(|d| d.transactions.iter())
    }

    pub fn transactions_mut(&mut self) -> impl Iterator<Item = &mut Transaction> + '_ {
        self.years
            .values_mut()
            .flat_map(|y| y.months.values_mut())
            .flat_map(|m| m.days.values_mut())
            .flat_map(|d| d.transactions.iter_mut())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions().count()
    }

    pub fn dirty_count(&self) -> usize {
        self.transactions().filter(|t| t.dirty).count()
    }

    /// Consume the tree, yielding each month's transactions in order.
    pub fn into_months(self) -> impl Iterator<Item = (i32, u32, Vec<Transaction>)> {
        self.years.into_iter().flat_map(|(year, y)| {
            y.months.into_iter().map(move |(month, m)| {
                let transactions = m
                    .days
                    .into_values()
                    .flat_map(|d| d.transactions)
                    .collect();
                (year, month, transactions)
            })
        })
    }

    pub fn add_transaction(&mut self, transaction: Transaction) -> MergeOutcome {
        let year = transaction.date.year();
        self.years
            .entry(year)
            .or_insert_with(|| Year::new(year))
            .add_transaction(transaction)
    }
}
