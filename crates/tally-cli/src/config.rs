use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_ledger::RateTable;
use tally_sync::{Credentials, SyncOptions};

pub const USERNAME_ENV: &str = "TALLY_SINK_USERNAME";
pub const PASSWORD_ENV: &str = "TALLY_SINK_PASSWORD";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub sink: SinkConfig,
    pub sync: SyncConfig,
    pub rates: RatesConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// File the offline sink is loaded from and saved to.
    pub snapshot: PathBuf,
    pub username: String,
    pub password: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("tally-sink.json"),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub category: String,
    pub category_group: String,
    /// Days before the previous sync that each periodic run covers again.
    pub overlap_days: u32,
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            category: options.category,
            category_group: options.category_group,
            overlap_days: 7,
            dry_run: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    /// Used when `table` is empty.
    pub major_per_minor: f64,
    pub table: Vec<RateEntry>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self { major_per_minor: 0.01, table: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub date: NaiveDate,
    pub rate: f64,
}

impl TallyConfig {
    /// Load from `path`, then apply environment overrides. A missing file
    /// yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup(USERNAME_ENV) {
            self.sink.username = username;
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.sink.password = password;
        }
    }

    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        if self.sink.username.is_empty() {
            bail!("sink username is not set (sink.username or {USERNAME_ENV})");
        }
        Ok(Credentials::new(&self.sink.username, &self.sink.password))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            category: self.sync.category.clone(),
            category_group: self.sync.category_group.clone(),
        }
    }

    pub fn rate_table(&self) -> anyhow::Result<RateTable> {
        let table = if self.rates.table.is_empty() {
            RateTable::fixed(self.rates.major_per_minor)?
        } else {
            RateTable::new(self.rates.table.iter().map(|e| (e.date, e.rate)))?
        };
        Ok(table)
    }
}
