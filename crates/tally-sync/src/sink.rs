//! The sink client boundary.
//!
//! The reconciler only ever talks to the sink through [`SinkClient`]; it is
//! handed one at construction and never builds its own.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::types::{AccountKind, Credentials};

/// An account as the sink reports it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SinkAccount {
    pub id: String,
    pub display_name: String,
    pub balance: f64,
}

/// A transaction as the sink stores it. `amount` is in the major currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SinkTransaction {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub merchant: String,
    pub amount: f64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub category_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub group_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAccount {
    pub kind: AccountKind,
    pub name: String,
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub account_id: String,
    pub amount: f64,
    pub merchant: String,
    pub category_id: String,
    pub notes: String,
}

/// Operations the reconciler needs from the authoritative ledger.
#[async_trait]
pub trait SinkClient: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> SyncResult<()>;
    async fn list_accounts(&self) -> SyncResult<Vec<SinkAccount>>;
    async fn create_account(&self, account: &NewAccount) -> SyncResult<String>;
    async fn update_account_balance(&self, account_id: &str, balance: f64) -> SyncResult<()>;
    /// Transactions of one account dated within `start..=end`.
    async fn list_transactions(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SyncResult<Vec<SinkTransaction>>;
    async fn create_transaction(&self, transaction: &NewTransaction) -> SyncResult<String>;
    async fn update_transaction(&self, transaction_id: &str, merchant: &str, notes: &str) -> SyncResult<()>;
    async fn list_categories(&self) -> SyncResult<Vec<Category>>;
    async fn list_category_groups(&self) -> SyncResult<Vec<CategoryGroup>>;
    async fn create_category(&self, group_id: &str, name: &str) -> SyncResult<String>;
}
