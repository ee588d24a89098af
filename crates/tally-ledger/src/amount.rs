use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::currency::Converter;
use crate::error::{LedgerError, LedgerResult};

/// A monetary value held in both the minor and the major currency.
///
/// When only one side is known at construction the other is derived once
/// through a [`Converter`] and stored. Accessors return the stored values and
/// never convert again.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    minor: f64,
    major: f64,
}

impl Amount {
    /// Build from a minor-currency value, converting as of `date`.
    pub fn from_minor(minor: f64, date: Option<NaiveDate>, converter: &dyn Converter) -> Self {
        Self {
            minor,
            major: converter.minor_to_major(minor, date),
        }
    }

    /// Build from a major-currency value, converting as of `date`.
    pub fn from_major(major: f64, date: Option<NaiveDate>, converter: &dyn Converter) -> Self {
        Self {
            minor: converter.major_to_minor(major, date),
            major,
        }
    }

    /// Store both values verbatim. No cross-check is made.
    pub const fn from_both(minor: f64, major: f64) -> Self {
        Self { minor, major }
    }

    /// Build from whichever values are supplied.
    ///
    /// Fails with [`LedgerError::InvalidArgument`] when neither is.
    pub fn new(
        minor: Option<f64>,
        major: Option<f64>,
        date: Option<NaiveDate>,
        converter: &dyn Converter,
    ) -> LedgerResult<Self> {
        match (minor, major) {
            (Some(minor), Some(major)) => Ok(Self::from_both(minor, major)),
            (Some(minor), None) => Ok(Self::from_minor(minor, date, converter)),
            (None, Some(major)) => Ok(Self::from_major(major, date, converter)),
            (None, None) => Err(LedgerError::InvalidArgument(
                "an amount needs a minor or a major value".into(),
            )),
        }
    }

    pub fn minor(&self) -> f64 {
        self.minor
    }

    pub fn major(&self) -> f64 {
        self.major
    }

    /// The minor value rounded to whole units. Used as the proxy key when
    /// transactions carry no identifier, and in sink notes.
    pub fn minor_units(&self) -> i64 {
        self.minor.round() as i64
    }

    pub fn negated(&self) -> Self {
        Self {
            minor: -self.minor,
            major: -self.major,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} minor, {:.2} major)", self.minor_units(), self.major)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::currency::RateTable;

    struct CountingConverter {
        calls: AtomicUsize,
    }

    impl Converter for CountingConverter {
        fn major_per_minor(&self, _date: Option<NaiveDate>) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            0.5
        }
    }

    fn rates() -> RateTable {
        RateTable::new([
            (NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 0.0091),
            (NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 0.0063),
        ])
        .unwrap()
    }

    #[test]
    fn from_minor_derives_major() {
        let amount = Amount::from_minor(150.0, None, &rates());
        assert_eq!(amount.minor(), 150.0);
        assert!(amount.major() > 0.0);
    }

    #[test]
    fn from_major_derives_minor() {
        let amount = Amount::from_major(1.0, None, &rates());
        assert_eq!(amount.major(), 1.0);
        assert!(amount.minor() > 0.0);
    }

    #[test]
    fn from_both_stores_verbatim() {
        let amount = Amount::from_both(150.0, 1.0);
        assert_eq!(amount.minor(), 150.0);
        assert_eq!(amount.major(), 1.0);
    }

    #[test]
    fn neither_value_is_invalid() {
        let err = Amount::new(None, None, None, &rates()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn new_dispatches_on_supplied_values() {
        let r = rates();
        assert_eq!(Amount::new(Some(150.0), Some(1.0), None, &r).unwrap(), Amount::from_both(150.0, 1.0));
        assert_eq!(Amount::new(Some(100.0), None, None, &r).unwrap().minor(), 100.0);
        assert_eq!(Amount::new(None, Some(2.0), None, &r).unwrap().major(), 2.0);
    }

    #[test]
    fn future_date_does_not_fail() {
        let tomorrow = chrono::Local::now().date_naive() + chrono::Days::new(1);
        let amount = Amount::from_major(1.0, Some(tomorrow), &rates());
        assert_eq!(amount.major(), 1.0);
        assert!(amount.minor() != 0.0);
    }

    #[test]
    fn converter_called_once_per_construction() {
        let converter = CountingConverter { calls: AtomicUsize::new(0) };
        let amount = Amount::from_minor(10.0, None, &converter);
        let _ = (amount.major(), amount.major(), amount.minor());
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);

        let _ = Amount::from_both(1.0, 2.0);
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn minor_units_rounds() {
        assert_eq!(Amount::from_both(149.6, 1.0).minor_units(), 150);
        assert_eq!(Amount::from_both(-2000.4, -13.0).minor_units(), -2000);
    }

    #[test]
    fn negated_flips_both_sides() {
        let amount = Amount::from_both(150.0, 1.0).negated();
        assert_eq!(amount, Amount::from_both(-150.0, -1.0));
    }

    #[test]
    fn display_format() {
        assert_eq!(Amount::from_both(150.0, 1.0).to_string(), "(150 minor, 1.00 major)");
    }

    proptest! {
        #[test]
        fn minor_round_trips_through_stable_rates(
            minor in -10_000_000i64..10_000_000i64,
            day in 0u32..2000,
        ) {
            let table = rates();
            let date = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap() + chrono::Days::new(day as u64);
            let amount = Amount::from_minor(minor as f64, Some(date), &table);
            let back = Amount::from_major(amount.major(), Some(date), &table);
            prop_assert!((back.minor() - minor as f64).abs() < 1e-6);
            prop_assert_eq!(back.minor_units(), minor);
        }
    }
}
