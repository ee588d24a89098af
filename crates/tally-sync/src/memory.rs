//! In-memory sink for tests, dry rehearsals, and file-backed offline runs.
//!
//! [`InMemorySink`] keeps accounts, transactions, and categories behind
//! `RwLock`s and implements the full [`SinkClient`] trait. Every call is
//! counted so tests can assert exactly which mutations a run issued.
//! [`SinkSnapshot`] is its serializable form.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::sink::{
    Category, CategoryGroup, NewAccount, NewTransaction, SinkAccount, SinkClient, SinkTransaction,
};
use crate::types::Credentials;

const FIRST_ID: u64 = 10_000;

/// Serializable contents of an [`InMemorySink`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkSnapshot {
    #[serde(default)]
    pub accounts: Vec<SinkAccount>,
    #[serde(default)]
    pub transactions: Vec<SinkTransaction>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub category_groups: Vec<CategoryGroup>,
    #[serde(default)]
    pub next_id: u64,
}

/// Number of times each sink operation was called.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub login: usize,
    pub list_accounts: usize,
    pub create_account: usize,
    pub update_account_balance: usize,
    pub list_transactions: usize,
    pub create_transaction: usize,
    pub update_transaction: usize,
    pub list_categories: usize,
    pub list_category_groups: usize,
    pub create_category: usize,
}

impl CallCounts {
    /// Calls that changed sink state.
    pub fn mutations(&self) -> usize {
        self.create_account
            + self.update_account_balance
            + self.create_transaction
            + self.update_transaction
            + self.create_category
    }
}

#[derive(Debug, Default)]
struct SinkState {
    accounts: BTreeMap<String, SinkAccount>,
    transactions: BTreeMap<String, SinkTransaction>,
    categories: Vec<Category>,
    category_groups: Vec<CategoryGroup>,
    next_id: u64,
    logged_in: bool,
}

impl SinkState {
    fn allocate_id(&mut self) -> String {
        self.next_id = self.next_id.max(FIRST_ID) + 1;
        self.next_id.to_string()
    }
}

/// An in-memory implementation of [`SinkClient`].
#[derive(Debug)]
pub struct InMemorySink {
    credentials: Option<Credentials>,
    fail_create_transaction: Option<usize>,
    state: RwLock<SinkState>,
    calls: RwLock<CallCounts>,
    list_ranges: RwLock<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl InMemorySink {
    /// Create an empty sink that accepts any credentials.
    pub fn new() -> Self {
        Self {
            credentials: None,
            fail_create_transaction: None,
            state: RwLock::new(SinkState::default()),
            calls: RwLock::new(CallCounts::default()),
            list_ranges: RwLock::new(Vec::new()),
        }
    }

    /// Only accept these credentials on login.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Fail the `n`th `create_transaction` call (1-based) with a transport
    /// error, leaving sink state untouched.
    pub fn fail_create_transaction_on(mut self, n: usize) -> Self {
        self.fail_create_transaction = Some(n);
        self
    }

    pub fn from_snapshot(snapshot: SinkSnapshot) -> Self {
        let sink = Self::new();
        if let Ok(mut state) = sink.state.write() {
            state.accounts = snapshot.accounts.into_iter().map(|a| (a.id.clone(), a)).collect();
            state.transactions = snapshot
                .transactions
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect();
            state.categories = snapshot.categories;
            state.category_groups = snapshot.category_groups;
            state.next_id = snapshot.next_id;
        }
        sink
    }

    pub fn snapshot(&self) -> SyncResult<SinkSnapshot> {
        let state = self.read_state()?;
        Ok(SinkSnapshot {
            accounts: state.accounts.values().cloned().collect(),
            transactions: state.transactions.values().cloned().collect(),
            categories: state.categories.clone(),
            category_groups: state.category_groups.clone(),
            next_id: state.next_id,
        })
    }

    // ---- Seeding ----

    pub fn add_account(&self, name: &str, balance: f64) -> SyncResult<String> {
        let mut state = self.write_state()?;
        let id = state.allocate_id();
        state.accounts.insert(
            id.clone(),
            SinkAccount { id: id.clone(), display_name: name.into(), balance },
        );
        Ok(id)
    }

    pub fn add_transaction(
        &self,
        account_id: &str,
        date: NaiveDate,
        merchant: &str,
        amount: f64,
        notes: &str,
    ) -> SyncResult<String> {
        let mut state = self.write_state()?;
        let id = state.allocate_id();
        state.transactions.insert(
            id.clone(),
            SinkTransaction {
                id: id.clone(),
                account_id: account_id.into(),
                date,
                merchant: merchant.into(),
                amount,
                notes: notes.into(),
                category_id: None,
            },
        );
        Ok(id)
    }

    pub fn add_category_group(&self, name: &str) -> SyncResult<String> {
        let mut state = self.write_state()?;
        let id = state.allocate_id();
        state.category_groups.push(CategoryGroup { id: id.clone(), name: name.into() });
        Ok(id)
    }

    pub fn add_category(&self, group_id: &str, name: &str) -> SyncResult<String> {
        let mut state = self.write_state()?;
        let id = state.allocate_id();
        state.categories.push(Category {
            id: id.clone(),
            name: name.into(),
            group_id: group_id.into(),
        });
        Ok(id)
    }

    // ---- Inspection ----

    pub fn calls(&self) -> CallCounts {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every `(account_id, start, end)` passed to `list_transactions`.
    pub fn list_ranges(&self) -> Vec<(String, NaiveDate, NaiveDate)> {
        self.list_ranges.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn account(&self, id: &str) -> Option<SinkAccount> {
        self.read_state().ok()?.accounts.get(id).cloned()
    }

    pub fn transaction(&self, id: &str) -> Option<SinkTransaction> {
        self.read_state().ok()?.transactions.get(id).cloned()
    }

    pub fn transactions_for(&self, account_id: &str) -> Vec<SinkTransaction> {
        self.read_state()
            .map(|s| {
                s.transactions
                    .values()
                    .filter(|t| t.account_id == account_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.read_state().map(|s| s.categories.clone()).unwrap_or_default()
    }

    // ---- Internals ----

    fn read_state(&self) -> SyncResult<std::sync::RwLockReadGuard<'_, SinkState>> {
        self.state
            .read()
            .map_err(|e| SyncError::Sink(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> SyncResult<std::sync::RwLockWriteGuard<'_, SinkState>> {
        self.state
            .write()
            .map_err(|e| SyncError::Sink(format!("lock poisoned: {e}")))
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts)) -> SyncResult<()> {
        let mut calls = self
            .calls
            .write()
            .map_err(|e| SyncError::Sink(format!("lock poisoned: {e}")))?;
        bump(&mut calls);
        Ok(())
    }

    fn authenticated(&self) -> SyncResult<std::sync::RwLockWriteGuard<'_, SinkState>> {
        let state = self.write_state()?;
        if !state.logged_in {
            return Err(SyncError::Auth("session not authenticated".into()));
        }
        Ok(state)
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SinkClient for InMemorySink {
    async fn login(&self, credentials: &Credentials) -> SyncResult<()> {
        self.count(|c| c.login += 1)?;
        if let Some(expected) = &self.credentials {
            if expected != credentials {
                return Err(SyncError::Auth(format!(
                    "invalid credentials for {}",
                    credentials.username
                )));
            }
        }
        self.write_state()?.logged_in = true;
        Ok(())
    }

    async fn list_accounts(&self) -> SyncResult<Vec<SinkAccount>> {
        self.count(|c| c.list_accounts += 1)?;
        let state = self.authenticated()?;
        Ok(state.accounts.values().cloned().collect())
    }

    async fn create_account(&self, account: &NewAccount) -> SyncResult<String> {
        self.count(|c| c.create_account += 1)?;
        let mut state = self.authenticated()?;
        let id = state.allocate_id();
        debug!(id = %id, name = %account.name, kind = %account.kind, "sink account created");
        state.accounts.insert(
            id.clone(),
            SinkAccount {
                id: id.clone(),
                display_name: account.name.clone(),
                balance: account.balance,
            },
        );
        Ok(id)
    }

    async fn update_account_balance(&self, account_id: &str, balance: f64) -> SyncResult<()> {
        self.count(|c| c.update_account_balance += 1)?;
        let mut state = self.authenticated()?;
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| SyncError::Sink(format!("no account with id {account_id}")))?;
        account.balance = balance;
        Ok(())
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SyncResult<Vec<SinkTransaction>> {
        self.count(|c| c.list_transactions += 1)?;
        if let Ok(mut ranges) = self.list_ranges.write() {
            ranges.push((account_id.to_string(), start, end));
        }
        let state = self.authenticated()?;
        let mut found: Vec<SinkTransaction> = state
            .transactions
            .values()
            .filter(|t| t.account_id == account_id && t.date >= start && t.date <= end)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(found)
    }

    async fn create_transaction(&self, transaction: &NewTransaction) -> SyncResult<String> {
        self.count(|c| c.create_transaction += 1)?;
        if self.fail_create_transaction == Some(self.calls().create_transaction) {
            return Err(SyncError::Transport("connection reset".into()));
        }
        let mut state = self.authenticated()?;
        if !state.accounts.contains_key(&transaction.account_id) {
            return Err(SyncError::Sink(format!(
                "no account with id {}",
                transaction.account_id
            )));
        }
        let id = state.allocate_id();
        state.transactions.insert(
            id.clone(),
            SinkTransaction {
                id: id.clone(),
                account_id: transaction.account_id.clone(),
                date: transaction.date,
                merchant: transaction.merchant.clone(),
                amount: transaction.amount,
                notes: transaction.notes.clone(),
                category_id: Some(transaction.category_id.clone()),
            },
        );
        Ok(id)
    }

    async fn update_transaction(&self, transaction_id: &str, merchant: &str, notes: &str) -> SyncResult<()> {
        self.count(|c| c.update_transaction += 1)?;
        let mut state = self.authenticated()?;
        let transaction = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| SyncError::Sink(format!("no transaction with id {transaction_id}")))?;
        transaction.merchant = merchant.into();
        transaction.notes = notes.into();
        Ok(())
    }

    async fn list_categories(&self) -> SyncResult<Vec<Category>> {
        self.count(|c| c.list_categories += 1)?;
        Ok(self.authenticated()?.categories.clone())
    }

    async fn list_category_groups(&self) -> SyncResult<Vec<CategoryGroup>> {
        self.count(|c| c.list_category_groups += 1)?;
        Ok(self.authenticated()?.category_groups.clone())
    }

    async fn create_category(&self, group_id: &str, name: &str) -> SyncResult<String> {
        self.count(|c| c.create_category += 1)?;
        let mut state = self.authenticated()?;
        if !state.category_groups.iter().any(|g| g.id == group_id) {
            return Err(SyncError::Sink(format!("no category group with id {group_id}")));
        }
        let id = state.allocate_id();
        state.categories.push(Category {
            id: id.clone(),
            name: name.into(),
            group_id: group_id.into(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountKind;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn logged_in() -> InMemorySink {
        let sink = InMemorySink::new();
        sink.login(&Credentials::new("u", "p")).await.unwrap();
        sink
    }

    #[tokio::test]
    async fn login_rejects_wrong_credentials() {
        let sink = InMemorySink::new().with_credentials(Credentials::new("u", "p"));
        let err = sink.login(&Credentials::new("u", "wrong")).await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
        sink.login(&Credentials::new("u", "p")).await.unwrap();
        assert_eq!(sink.calls().login, 2);
    }

    #[tokio::test]
    async fn calls_require_login() {
        let sink = InMemorySink::new();
        let err = sink.list_accounts().await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
    }

    #[tokio::test]
    async fn ids_are_unique_and_increasing() {
        let sink = logged_in().await;
        let a = sink.add_account("A", 1.0).unwrap();
        let b = sink.add_account("B", 2.0).unwrap();
        assert_ne!(a, b);
        assert!(b.parse::<u64>().unwrap() > a.parse::<u64>().unwrap());
    }

    #[tokio::test]
    async fn create_and_list_accounts() {
        let sink = logged_in().await;
        let id = sink
            .create_account(&NewAccount { kind: AccountKind::Checking, name: "New".into(), balance: 5.0 })
            .await
            .unwrap();
        let accounts = sink.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, id);
        assert_eq!(accounts[0].display_name, "New");
        assert_eq!(sink.calls().create_account, 1);
    }

    #[tokio::test]
    async fn update_balance_of_missing_account_fails() {
        let sink = logged_in().await;
        assert!(sink.update_account_balance("nope", 1.0).await.is_err());
    }

    #[tokio::test]
    async fn list_transactions_filters_by_account_and_range() {
        let sink = logged_in().await;
        let a = sink.add_account("A", 0.0).unwrap();
        let b = sink.add_account("B", 0.0).unwrap();
        sink.add_transaction(&a, d(2020, 9, 30), "in", 1.0, "").unwrap();
        sink.add_transaction(&a, d(2020, 9, 1), "in too", 1.0, "").unwrap();
        sink.add_transaction(&a, d(2020, 10, 1), "after", 1.0, "").unwrap();
        sink.add_transaction(&b, d(2020, 9, 15), "other account", 1.0, "").unwrap();

        let found = sink.list_transactions(&a, d(2020, 9, 1), d(2020, 9, 30)).await.unwrap();
        let merchants: Vec<_> = found.iter().map(|t| t.merchant.as_str()).collect();
        assert_eq!(merchants, vec!["in too", "in"]);
        assert_eq!(sink.list_ranges(), vec![(a, d(2020, 9, 1), d(2020, 9, 30))]);
    }

    #[tokio::test]
    async fn create_and_update_transaction() {
        let sink = logged_in().await;
        let account = sink.add_account("A", 0.0).unwrap();
        let id = sink
            .create_transaction(&NewTransaction {
                date: d(2020, 9, 10),
                account_id: account.clone(),
                amount: 6.0,
                merchant: "Amazon".into(),
                category_id: "c".into(),
                notes: "amount_minor=123".into(),
            })
            .await
            .unwrap();
        sink.update_transaction(&id, "Amazon JP", "amount_minor=123,source_id=9").await.unwrap();

        let stored = sink.transaction(&id).unwrap();
        assert_eq!(stored.merchant, "Amazon JP");
        assert_eq!(stored.notes, "amount_minor=123,source_id=9");
        assert_eq!(stored.category_id.as_deref(), Some("c"));
        assert_eq!(sink.transactions_for(&account).len(), 1);
        assert_eq!(sink.calls().mutations(), 2);
    }

    #[tokio::test]
    async fn injected_create_failure_hits_only_that_call() {
        let sink = InMemorySink::new().fail_create_transaction_on(2);
        sink.login(&Credentials::new("u", "p")).await.unwrap();
        let account = sink.add_account("A", 0.0).unwrap();
        let new = |merchant: &str| NewTransaction {
            date: d(2020, 9, 10),
            account_id: account.clone(),
            amount: 1.0,
            merchant: merchant.into(),
            category_id: "c".into(),
            notes: "amount_minor=2".into(),
        };

        sink.create_transaction(&new("one")).await.unwrap();
        let err = sink.create_transaction(&new("two")).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(err.is_fatal());
        sink.create_transaction(&new("three")).await.unwrap();

        let merchants: Vec<_> = sink.transactions_for(&account).into_iter().map(|t| t.merchant).collect();
        assert_eq!(merchants, vec!["one", "three"]);
        assert_eq!(sink.calls().create_transaction, 3);
    }

    #[tokio::test]
    async fn create_category_requires_known_group() {
        let sink = logged_in().await;
        assert!(sink.create_category("missing", "tally").await.is_err());
        let group = sink.add_category_group("Other").unwrap();
        let id = sink.create_category(&group, "tally").await.unwrap();
        let categories = sink.list_categories().await.unwrap();
        assert_eq!(categories, vec![Category { id, name: "tally".into(), group_id: group }]);
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_contents() {
        let sink = logged_in().await;
        let account = sink.add_account("A", 10.0).unwrap();
        sink.add_transaction(&account, d(2020, 9, 10), "m", 1.0, "amount_minor=150").unwrap();
        sink.add_category_group("Other").unwrap();

        let snapshot = sink.snapshot().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = InMemorySink::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.snapshot().unwrap(), snapshot);

        restored.login(&Credentials::new("u", "p")).await.unwrap();
        let next = restored.add_account("B", 0.0).unwrap();
        assert!(next.parse::<u64>().unwrap() > snapshot.next_id);
        assert!(restored.account(&next).is_some());
    }
}
