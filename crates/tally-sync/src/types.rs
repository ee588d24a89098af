use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account type and subtype used when creating an account in the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Checking,
    CreditCard,
}

impl AccountKind {
    /// Naive inference: a negative balance means money is owed.
    pub fn for_balance(balance: f64) -> Self {
        if balance < 0.0 {
            Self::CreditCard
        } else {
            Self::Checking
        }
    }

    pub fn account_type(&self) -> &'static str {
        match self {
            Self::Checking => "depository",
            Self::CreditCard => "credit",
        }
    }

    pub fn subtype(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::CreditCard => "credit_card",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_type(), self.subtype())
    }
}

/// Reconciler settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Category assigned to every transaction the reconciler creates.
    pub category: String,
    /// Group the category is created under when it does not exist yet.
    pub category_group: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            category: "tally".into(),
            category_group: "Other".into(),
        }
    }
}

/// Where a run is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncState {
    #[default]
    Unauthenticated,
    /// Logged in; sink accounts are known.
    Hydrated,
    /// At least one source account has been merged.
    Reconciled,
    /// A non-dry push has completed.
    Pushed,
}

/// One mutation a push issues, or would issue under dry run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    CreateAccount {
        name: String,
        kind: AccountKind,
        balance: f64,
    },
    CreateCategory {
        name: String,
        group: String,
    },
    CreateTransaction {
        account: String,
        date: NaiveDate,
        merchant: String,
        amount: f64,
        notes: String,
    },
    UpdateTransaction {
        account: String,
        sink_id: String,
        merchant: String,
        notes: String,
    },
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateAccount { name, kind, balance } => {
                write!(f, "create account {name} ({kind}) balance {balance:.2}")
            }
            Self::CreateCategory { name, group } => write!(f, "create category {name} in {group}"),
            Self::CreateTransaction { account, date, merchant, amount, notes } => {
                write!(f, "create transaction {account} {date} {merchant} {amount:.2} [{notes}]")
            }
            Self::UpdateTransaction { account, sink_id, merchant, notes } => {
                write!(f, "update transaction {account} #{sink_id} {merchant} [{notes}]")
            }
        }
    }
}

/// Outcome of a push, identical in shape for dry and real runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PushReport {
    pub dry_run: bool,
    pub accounts_created: usize,
    pub categories_created: usize,
    pub transactions_created: usize,
    pub transactions_updated: usize,
    pub actions: Vec<PlannedAction>,
}

impl PushReport {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run, ..Default::default() }
    }

    pub fn record(&mut self, action: PlannedAction) {
        match &action {
            PlannedAction::CreateAccount { .. } => self.accounts_created += 1,
            PlannedAction::CreateCategory { .. } => self.categories_created += 1,
            PlannedAction::CreateTransaction { .. } => self.transactions_created += 1,
            PlannedAction::UpdateTransaction { .. } => self.transactions_updated += 1,
        }
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.actions.len()
    }
}
