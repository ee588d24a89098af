//! The sync orchestrator.
//!
//! A [`Reconciler`] owns one ledger tree per tracked account and drives a
//! single run against a [`SinkClient`]:
//!
//! 1. [`login`](Reconciler::login) authenticates and seeds an empty tree for
//!    every sink account.
//! 2. [`import_account`](Reconciler::import_account) merges a source account,
//!    pulling each calendar month from the sink the first time it is touched.
//! 3. [`push`](Reconciler::push) creates missing accounts and writes every
//!    dirty transaction back, or only plans it under dry run.
//!
//! Sink calls are awaited one at a time, in ascending account name and
//! date order.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Months, NaiveDate};
use tracing::{debug, info, warn};

use tally_ledger::{Account, Amount, Converter, LedgerError, Transaction};

use crate::error::{SyncError, SyncResult};
use crate::notes;
use crate::sink::{NewAccount, NewTransaction, SinkClient};
use crate::types::{AccountKind, Credentials, PlannedAction, PushReport, SyncOptions, SyncState};

/// Drives one login → import → push run against a sink.
pub struct Reconciler<S: SinkClient> {
    sink: S,
    converter: Arc<dyn Converter>,
    options: SyncOptions,
    accounts: BTreeMap<String, Account>,
    hydrated: HashSet<(String, i32, u32)>,
    category_id: Option<String>,
    state: SyncState,
}

impl<S: SinkClient> Reconciler<S> {
    pub fn new(sink: S, converter: Arc<dyn Converter>, options: SyncOptions) -> Self {
        Self {
            sink,
            converter,
            options,
            accounts: BTreeMap::new(),
            hydrated: HashSet::new(),
            category_id: None,
            state: SyncState::Unauthenticated,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn accounts(&self) -> &BTreeMap<String, Account> {
        &self.accounts
    }

    pub fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    /// Authenticate and seed one empty tree per sink account.
    ///
    /// Authentication failures are returned as [`SyncError::Auth`] and are
    /// not retried.
    pub async fn login(&mut self, credentials: &Credentials) -> SyncResult<()> {
        self.sink.login(credentials).await?;

        self.accounts.clear();
        self.hydrated.clear();
        self.category_id = None;

        for remote in self.sink.list_accounts().await? {
            if self.accounts.contains_key(&remote.display_name) {
                warn!(name = %remote.display_name, id = %remote.id, "duplicate sink account name, keeping first");
                continue;
            }
            let balance = Amount::from_major(remote.balance, None, self.converter.as_ref());
            let account = Account::new(remote.display_name.clone())
                .with_sink_id(remote.id)
                .with_balance(balance);
            self.accounts.insert(remote.display_name, account);
        }

        info!(user = %credentials.username, accounts = self.accounts.len(), "logged in to sink");
        self.state = SyncState::Hydrated;
        Ok(())
    }

    /// Merge a source account into the tracked tree of the same name.
    pub async fn import_account(&mut self, incoming: Account) -> SyncResult<()> {
        self.require_login()?;

        let name = incoming.name.clone();
        let tracked = self.accounts.entry(name.clone()).or_insert_with(|| {
            debug!(account = %name, "tracking new account");
            let mut account = Account::new(name.clone());
            account.balance = incoming.balance;
            account
        });

        if let Some(balance) = incoming.balance {
            tracked.balance = Some(balance);
            if let Some(sink_id) = tracked.sink_id() {
                info!(account = %name, balance = balance.major(), "updating sink balance");
                self.sink.update_account_balance(sink_id, balance.major()).await?;
            }
        }

        let mut merged = 0usize;
        let mut changed = 0usize;
        for (year, month, transactions) in incoming.into_months() {
            let key = (name.clone(), year, month);
            if !self.hydrated.contains(&key) {
                self.pull_transactions(&name, year, month).await?;
            }
            let tracked = self
                .accounts
                .get_mut(&name)
                .ok_or_else(|| SyncError::UnknownAccount(name.clone()))?;
            for transaction in transactions {
                if tracked.add_transaction(transaction).changed_existing() {
                    changed += 1;
                }
                merged += 1;
            }
        }

        debug!(account = %name, merged, changed, "account imported");
        self.state = SyncState::Reconciled;
        Ok(())
    }

    /// Fetch one calendar month of a tracked account from the sink and merge
    /// it. Does nothing for an account the sink does not know yet.
    ///
    /// Returns the number of sink transactions merged.
    pub async fn pull_transactions(&mut self, name: &str, year: i32, month: u32) -> SyncResult<usize> {
        let account = self
            .accounts
            .get_mut(name)
            .ok_or_else(|| SyncError::UnknownAccount(name.to_string()))?;
        let Some(sink_id) = account.sink_id().map(str::to_string) else {
            return Ok(0);
        };

        let (start, end) = month_bounds(year, month)?;
        let remote = self.sink.list_transactions(&sink_id, start, end).await?;

        let mut pulled = 0usize;
        for record in remote {
            let fields = match notes::decode(&record.notes) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(account = %name, id = %record.id, error = %e, "skipping sink transaction");
                    continue;
                }
            };
            let amount = Amount::from_both(fields.amount_minor as f64, record.amount);
            let mut transaction =
                Transaction::new(record.date, record.merchant, amount).with_sink_id(record.id);
            if let Some(source_id) = fields.source_id {
                transaction = transaction.with_source_id(source_id);
            }
            account.add_transaction(transaction);
            pulled += 1;
        }

        debug!(account = %name, year, month, pulled, "pulled sink transactions");
        self.hydrated.insert((name.to_string(), year, month));
        Ok(pulled)
    }

    /// Write every pending change to the sink.
    ///
    /// Accounts without a sink id are created first, then each dirty
    /// transaction is updated or created. Under `dry_run` the same lookups
    /// run and the same actions are reported, but nothing is mutated and
    /// dirty flags are left set.
    pub async fn push(&mut self, dry_run: bool) -> SyncResult<PushReport> {
        self.require_login()?;

        let Self { sink, options, accounts, category_id, .. } = self;
        let mut report = PushReport::new(dry_run);
        let mut category_planned = false;

        for account in accounts.values_mut() {
            if account.sink_id().is_none() {
                let balance = account.balance.map(|b| b.major()).unwrap_or(0.0);
                let kind = AccountKind::for_balance(balance);
                let action = PlannedAction::CreateAccount {
                    name: account.name.clone(),
                    kind,
                    balance,
                };
                info!(dry_run, %action, "push");
                report.record(action);
                if !dry_run {
                    let id = sink
                        .create_account(&NewAccount { kind, name: account.name.clone(), balance })
                        .await?;
                    account.sink_id = Some(id);
                }
            }

            let account_name = account.name.clone();
            let account_sink_id = account.sink_id().unwrap_or_default().to_string();

            for transaction in account.transactions_mut().filter(|t| t.dirty) {
                let note = notes::for_transaction(transaction);

                if let Some(id) = transaction.sink_id().map(str::to_string) {
                    let action = PlannedAction::UpdateTransaction {
                        account: account_name.clone(),
                        sink_id: id.clone(),
                        merchant: transaction.merchant.clone(),
                        notes: note.clone(),
                    };
                    info!(dry_run, %action, "push");
                    report.record(action);
                    if !dry_run {
                        transaction.dirty = false;
                        sink.update_transaction(&id, &transaction.merchant, &note).await?;
                    }
                    continue;
                }

                let category = match category_id.clone() {
                    Some(id) => Some(id),
                    None if dry_run && category_planned => None,
                    None => {
                        let resolved =
                            resolve_category(&*sink, options, dry_run, &mut report).await?;
                        category_planned = true;
                        if resolved.is_some() {
                            *category_id = resolved.clone();
                        }
                        resolved
                    }
                };

                let action = PlannedAction::CreateTransaction {
                    account: account_name.clone(),
                    date: transaction.date,
                    merchant: transaction.merchant.clone(),
                    amount: transaction.amount.major(),
                    notes: note.clone(),
                };
                info!(dry_run, %action, "push");
                report.record(action);
                if !dry_run {
                    transaction.dirty = false;
                    let id = sink
                        .create_transaction(&NewTransaction {
                            date: transaction.date,
                            account_id: account_sink_id.clone(),
                            amount: transaction.amount.major(),
                            merchant: transaction.merchant.clone(),
                            category_id: category.unwrap_or_default(),
                            notes: note,
                        })
                        .await?;
                    transaction.sink_id = Some(id);
                }
            }
        }

        info!(
            dry_run,
            accounts_created = report.accounts_created,
            transactions_created = report.transactions_created,
            transactions_updated = report.transactions_updated,
            "push finished"
        );
        if !dry_run {
            self.state = SyncState::Pushed;
        }
        Ok(report)
    }

    fn require_login(&self) -> SyncResult<()> {
        if self.state == SyncState::Unauthenticated {
            return Err(SyncError::NotLoggedIn);
        }
        Ok(())
    }
}

/// Find the reconciliation category, creating it under the configured group
/// when missing. Returns `None` only when creation was planned under dry run.
async fn resolve_category<S: SinkClient>(
    sink: &S,
    options: &SyncOptions,
    dry_run: bool,
    report: &mut PushReport,
) -> SyncResult<Option<String>> {
    if let Some(found) = sink
        .list_categories()
        .await?
        .into_iter()
        .find(|c| c.name == options.category)
    {
        return Ok(Some(found.id));
    }

    let group = sink
        .list_category_groups()
        .await?
        .into_iter()
        .find(|g| g.name == options.category_group)
        .ok_or_else(|| SyncError::CategoryGroupMissing(options.category_group.clone()))?;

    let action = PlannedAction::CreateCategory {
        name: options.category.clone(),
        group: group.name.clone(),
    };
    info!(dry_run, %action, "push");
    report.record(action);
    if dry_run {
        return Ok(None);
    }
    let id = sink.create_category(&group.id, &options.category).await?;
    Ok(Some(id))
}

/// First and last day of a calendar month.
fn month_bounds(year: i32, month: u32) -> SyncResult<(NaiveDate, NaiveDate)> {
    let invalid = || LedgerError::InvalidArgument(format!("no such month: {year}-{month:02}"));
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(invalid)?;
    Ok((start, end))
}
