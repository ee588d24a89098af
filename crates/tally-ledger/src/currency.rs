//! Currency conversion between the minor and the major currency.
//!
//! Rates are expressed as major units per minor unit. A lookup never fails:
//! dates outside the table (including future dates) fall back to the
//! nearest date that has a rate.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use crate::error::{LedgerError, LedgerResult};

/// Conversion boundary used when an [`Amount`](crate::Amount) is built from a
/// single denomination.
pub trait Converter: Send + Sync {
    /// Major units per minor unit, as of `date` (latest rate when `None`).
    fn major_per_minor(&self, date: Option<NaiveDate>) -> f64;

    fn minor_to_major(&self, minor: f64, date: Option<NaiveDate>) -> f64 {
        minor * self.major_per_minor(date)
    }

    fn major_to_minor(&self, major: f64, date: Option<NaiveDate>) -> f64 {
        major / self.major_per_minor(date)
    }
}

/// A dated table of exchange rates.
#[derive(Clone, Debug, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<NaiveDate, f64>,
    latest: f64,
}

impl RateTable {
    /// Build a table from `(date, major_per_minor)` pairs.
    ///
    /// The table must hold at least one rate and every rate must be a
    /// positive, finite number.
    pub fn new(rates: impl IntoIterator<Item = (NaiveDate, f64)>) -> LedgerResult<Self> {
        let rates: BTreeMap<NaiveDate, f64> = rates.into_iter().collect();
        if let Some((date, rate)) = rates.iter().find(|(_, r)| !(r.is_finite() && **r > 0.0)) {
            return Err(LedgerError::InvalidRateTable(format!(
                "rate on {date} must be positive, got {rate}"
            )));
        }
        let latest = match rates.values().next_back() {
            Some(rate) => *rate,
            None => {
                return Err(LedgerError::InvalidRateTable(
                    "at least one rate is required".into(),
                ))
            }
        };
        Ok(Self { rates, latest })
    }

    /// A table holding a single rate that applies to every date.
    pub fn fixed(major_per_minor: f64) -> LedgerResult<Self> {
        Self::new([(NaiveDate::MIN, major_per_minor)])
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Rate for `date`: exact match, else the nearest dated rate. Ties go to
    /// the earlier date.
    pub fn rate_on(&self, date: NaiveDate) -> f64 {
        let before = self.rates.range(..=date).next_back();
        let after = self.rates.range(date..).next();
        match (before, after) {
            (Some((b, rb)), Some((a, ra))) => {
                if (date - *b) <= (*a - date) {
                    *rb
                } else {
                    *ra
                }
            }
            (Some((_, r)), None) | (None, Some((_, r))) => *r,
            (None, None) => self.latest,
        }
    }
}

impl Converter for RateTable {
    fn major_per_minor(&self, date: Option<NaiveDate>) -> f64 {
        match date {
            Some(date) => self.rate_on(date),
            None => self.latest,
        }
    }
}
