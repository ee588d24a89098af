use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// A single ledger entry.
///
/// `source_id` and `sink_id` identify the entry in the source and the sink
/// respectively; either, both, or neither may be known. `dirty` marks local
/// changes that the sink has not seen yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub merchant: String,
    pub amount: Amount,
    pub source_id: Option<String>,
    pub sink_id: Option<String>,
    pub dirty: bool,
}

impl Transaction {
    pub fn new(date: NaiveDate, merchant: impl Into<String>, amount: Amount) -> Self {
        Self {
            date,
            merchant: merchant.into(),
            amount,
            source_id: None,
            sink_id: None,
            dirty: false,
        }
    }

    /// Attach a source id. An empty id leaves the transaction unidentified.
    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = non_empty(id.into());
        self
    }

    /// Attach a sink id. An empty id leaves the transaction unidentified.
    pub fn with_sink_id(mut self, id: impl Into<String>) -> Self {
        self.sink_id = non_empty(id.into());
        self
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn sink_id(&self) -> Option<&str> {
        self.sink_id.as_deref().filter(|id| !id.is_empty())
    }

    /// True when the transaction has neither a source nor a sink id.
    pub fn is_unidentified(&self) -> bool {
        self.source_id().is_none() && self.sink_id().is_none()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} source_id={} sink_id={}",
            self.date,
            self.merchant,
            self.amount,
            self.source_id().unwrap_or("-"),
            self.sink_id().unwrap_or("-"),
        )
    }
}

fn non_empty(id: String) -> Option<String> {
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 9, 10).unwrap()
    }

    #[test]
    fn new_transaction_is_clean_and_unidentified() {
        let t = Transaction::new(date(), "Amazon", Amount::from_both(123.0, 6.0));
        assert!(!t.dirty);
        assert!(t.is_unidentified());
    }

    #[test]
    fn empty_ids_are_ignored() {
        let t = Transaction::new(date(), "Amazon", Amount::from_both(1.0, 1.0))
            .with_source_id("")
            .with_sink_id("");
        assert!(t.is_unidentified());
    }

    #[test]
    fn empty_id_set_directly_reads_as_absent() {
        let mut t = Transaction::new(date(), "Amazon", Amount::from_both(1.0, 1.0));
        t.source_id = Some(String::new());
        assert_eq!(t.source_id(), None);
    }

    #[test]
    fn ids_are_kept() {
        let t = Transaction::new(date(), "Amazon", Amount::from_both(1.0, 1.0))
            .with_source_id("1234")
            .with_sink_id("45858");
        assert_eq!(t.source_id(), Some("1234"));
        assert_eq!(t.sink_id(), Some("45858"));
        assert!(!t.is_unidentified());
    }

    #[test]
    fn display_format() {
        let t = Transaction::new(date(), "Amazon", Amount::from_both(123.0, 6.0)).with_source_id("9");
        assert_eq!(t.to_string(), "2020-09-10 Amazon (123 minor, 6.00 major) source_id=9 sink_id=-");
    }
}
