//! Source-side attribution.
//!
//! The source reports money movements between accounts. [`SourceLedger`]
//! assigns each record to one account, fixes its sign, and groups the
//! result into one [`Account`] tree per account name, ready for
//! [`Reconciler::import_account`](crate::Reconciler::import_account).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use tally_ledger::{Account, Amount, Converter, LedgerError, Transaction};

use crate::error::SyncResult;

/// One record as exported by the source. Amounts are unsigned minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub merchant: String,
    pub amount_minor: i64,
    #[serde(default)]
    pub debit_account: Option<String>,
    #[serde(default)]
    pub credit_account: Option<String>,
}

/// A full source export: starting balances plus raw records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceExport {
    /// Account name to balance in minor units.
    #[serde(default)]
    pub balances: BTreeMap<String, i64>,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

/// Builds per-account trees from source records.
pub struct SourceLedger {
    converter: Arc<dyn Converter>,
    range: Option<(NaiveDate, NaiveDate)>,
    accounts: BTreeMap<String, Account>,
    skipped: usize,
}

impl SourceLedger {
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self {
            converter,
            range: None,
            accounts: BTreeMap::new(),
            skipped: 0,
        }
    }

    /// Only keep records dated within `start..=end`.
    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> SyncResult<Self> {
        if start > end {
            return Err(LedgerError::InvalidArgument(format!(
                "range start {start} is after end {end}"
            ))
            .into());
        }
        self.range = Some((start, end));
        Ok(self)
    }

    /// Seed an account with its current balance.
    pub fn add_balance(&mut self, name: &str, balance_minor: i64) {
        let balance = Amount::from_minor(balance_minor as f64, None, self.converter.as_ref());
        let account = self.account_mut(name);
        account.balance = Some(balance);
    }

    /// Attribute one record. Returns false when it fell outside the range.
    pub fn add_raw(&mut self, raw: RawTransaction) -> SyncResult<bool> {
        if let Some((start, end)) = self.range {
            if raw.date < start || raw.date > end {
                trace!(id = %raw.id, date = %raw.date, "source record outside range");
                self.skipped += 1;
                return Ok(false);
            }
        }

        let amount = Amount::from_minor(
            raw.amount_minor as f64,
            Some(raw.date),
            self.converter.as_ref(),
        );
        let (name, amount) = match (non_empty(raw.debit_account), non_empty(raw.credit_account)) {
            (Some(debit), _) => (debit, amount.negated()),
            (None, Some(credit)) => (credit, amount),
            (None, None) => {
                return Err(LedgerError::InvalidArgument(format!(
                    "source record {} names no account",
                    raw.id
                ))
                .into())
            }
        };

        let transaction = Transaction::new(raw.date, raw.merchant, amount).with_source_id(raw.id);
        self.account_mut(&name).add_transaction(transaction);
        Ok(true)
    }

    pub fn from_export(
        converter: Arc<dyn Converter>,
        export: SourceExport,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> SyncResult<Self> {
        let mut ledger = Self::new(converter);
        if let Some((start, end)) = range {
            ledger = ledger.with_range(start, end)?;
        }
        for (name, balance) in &export.balances {
            ledger.add_balance(name, *balance);
        }
        for raw in export.transactions {
            ledger.add_raw(raw)?;
        }
        debug!(
            accounts = ledger.accounts.len(),
            skipped = ledger.skipped,
            "source export attributed"
        );
        Ok(ledger)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> + '_ {
        self.accounts.values()
    }

    /// Records dropped for falling outside the range.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_accounts(self) -> Vec<Account> {
        self.accounts.into_values().collect()
    }

    fn account_mut(&mut self, name: &str) -> &mut Account {
        self.accounts
            .entry(name.to_string())
            .or_insert_with(|| Account::new(name))
    }
}

fn non_empty(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use tally_ledger::RateTable;

    use super::*;
    use crate::error::SyncError;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn converter() -> Arc<dyn Converter> {
        Arc::new(RateTable::fixed(0.5).unwrap())
    }

    fn raw(id: &str, date: NaiveDate, amount: i64, debit: Option<&str>, credit: Option<&str>) -> RawTransaction {
        RawTransaction {
            id: id.into(),
            date,
            merchant: format!("m{id}"),
            amount_minor: amount,
            debit_account: debit.map(Into::into),
            credit_account: credit.map(Into::into),
        }
    }

    #[test]
    fn debit_is_negated_and_credit_is_positive() {
        let mut ledger = SourceLedger::new(converter());
        ledger.add_raw(raw("1", d(2020, 9, 10), 100, Some("Wallet"), None)).unwrap();
        ledger.add_raw(raw("2", d(2020, 9, 11), 300, None, Some("Bank"))).unwrap();

        let accounts = ledger.into_accounts();
        let names: Vec<_> = accounts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Bank", "Wallet"]);

        let bank: Vec<_> = accounts[0].transactions().collect();
        assert_eq!(bank[0].amount.minor(), 300.0);
        assert_eq!(bank[0].amount.major(), 150.0);
        let wallet: Vec<_> = accounts[1].transactions().collect();
        assert_eq!(wallet[0].amount.minor(), -100.0);
        assert_eq!(wallet[0].source_id(), Some("1"));
    }

    #[test]
    fn debit_wins_when_both_accounts_are_named() {
        let mut ledger = SourceLedger::new(converter());
        ledger.add_raw(raw("1", d(2020, 9, 10), 100, Some("Wallet"), Some("Bank"))).unwrap();
        let accounts = ledger.into_accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Wallet");
    }

    #[test]
    fn record_without_account_is_rejected() {
        let mut ledger = SourceLedger::new(converter());
        let err = ledger.add_raw(raw("1", d(2020, 9, 10), 100, None, Some(""))).unwrap_err();
        assert!(matches!(err, SyncError::Ledger(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn records_outside_range_are_skipped() {
        let mut ledger = SourceLedger::new(converter())
            .with_range(d(2020, 9, 1), d(2020, 9, 30))
            .unwrap();
        assert!(!ledger.add_raw(raw("1", d(2020, 8, 31), 1, Some("A"), None)).unwrap());
        assert!(ledger.add_raw(raw("2", d(2020, 9, 30), 1, Some("A"), None)).unwrap());
        assert!(!ledger.add_raw(raw("3", d(2020, 10, 1), 1, Some("A"), None)).unwrap());
        assert_eq!(ledger.skipped(), 2);
        assert_eq!(ledger.into_accounts()[0].transaction_count(), 1);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(SourceLedger::new(converter()).with_range(d(2020, 9, 2), d(2020, 9, 1)).is_err());
    }

    #[test]
    fn balances_seed_accounts() {
        let mut ledger = SourceLedger::new(converter());
        ledger.add_balance("Wallet", 2000);
        ledger.add_raw(raw("1", d(2020, 9, 10), 100, None, Some("Bank"))).unwrap();

        let accounts = ledger.into_accounts();
        let bank = &accounts[0];
        let wallet = &accounts[1];
        assert!(bank.balance.is_none());
        assert_eq!(wallet.balance.unwrap().major(), 1000.0);
        assert_eq!(wallet.sink_id(), None);
    }

    #[test]
    fn export_parses_from_json() {
        let json = r#"{
            "balances": {"Wallet": 5000},
            "transactions": [
                {"id": "7", "date": "2020-09-10", "merchant": "Amazon",
                 "amount_minor": 123, "debit_account": "Wallet"}
            ]
        }"#;
        let export: SourceExport = serde_json::from_str(json).unwrap();
        let ledger = SourceLedger::from_export(converter(), export, None).unwrap();
        let accounts: Vec<_> = ledger.accounts().collect();
        assert_eq!(accounts.len(), 1);
        let t: Vec<_> = accounts[0].transactions().collect();
        assert_eq!(t[0].merchant, "Amazon");
        assert_eq!(t[0].amount.minor_units(), -123);
    }
}
