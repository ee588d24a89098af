//! Encoding of the note field the reconciler writes onto sink transactions.
//!
//! Format: `amount_minor=<integer>` optionally followed by
//! `,source_id=<id>`. The note is the only state kept in the sink, so
//! decoding an encoded note must give back the same amount and id. The id
//! runs to the end of the note.

use std::sync::LazyLock;

use regex::Regex;
use tally_ledger::Transaction;

use crate::error::{SyncError, SyncResult};

static NOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"amount_minor=(?P<amount>-?[0-9]+)(?:,source_id=(?P<id>(?s:.+)))?")
        .expect("note pattern is valid")
});

/// Fields recovered from a sink note.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteFields {
    pub amount_minor: i64,
    pub source_id: Option<String>,
}

pub fn encode(amount_minor: i64, source_id: Option<&str>) -> String {
    match source_id.filter(|id| !id.is_empty()) {
        Some(id) => format!("amount_minor={amount_minor},source_id={id}"),
        None => format!("amount_minor={amount_minor}"),
    }
}

/// Note for a transaction about to be written to the sink.
pub fn for_transaction(transaction: &Transaction) -> String {
    encode(transaction.amount.minor_units(), transaction.source_id())
}

/// Find and decode the encoded fields anywhere in `note`.
pub fn decode(note: &str) -> SyncResult<NoteFields> {
    let malformed = |reason: String| SyncError::MalformedRemoteNote {
        note: note.to_string(),
        reason,
    };

    let caps = NOTE_RE
        .captures(note)
        .ok_or_else(|| malformed("no integer amount_minor".into()))?;
    let amount_minor = caps["amount"]
        .parse::<i64>()
        .map_err(|e| malformed(format!("amount_minor out of range: {e}")))?;
    let source_id = caps.name("id").map(|m| m.as_str().to_string());

    Ok(NoteFields { amount_minor, source_id })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use tally_ledger::Amount;

    use super::*;

    #[test]
    fn encode_without_source_id() {
        assert_eq!(encode(2000, None), "amount_minor=2000");
        assert_eq!(encode(2000, Some("")), "amount_minor=2000");
    }

    #[test]
    fn encode_with_source_id() {
        assert_eq!(encode(-123, Some("1234")), "amount_minor=-123,source_id=1234");
    }

    #[test]
    fn for_transaction_rounds_minor_amount() {
        let t = Transaction::new(
            NaiveDate::from_ymd_opt(2020, 9, 10).unwrap(),
            "Amazon",
            Amount::from_both(122.6, 6.0),
        )
        .with_source_id("1234");
        assert_eq!(for_transaction(&t), "amount_minor=123,source_id=1234");
    }

    #[test]
    fn decode_amount_only() {
        let f = decode("amount_minor=60000").unwrap();
        assert_eq!(f, NoteFields { amount_minor: 60000, source_id: None });
    }

    #[test]
    fn decode_with_source_id() {
        let f = decode("amount_minor=2000,source_id=5467").unwrap();
        assert_eq!(f.amount_minor, 2000);
        assert_eq!(f.source_id.as_deref(), Some("5467"));
    }

    #[test]
    fn decode_finds_fields_after_other_text() {
        let f = decode("lunch amount_minor=-850,source_id=77").unwrap();
        assert_eq!(f.amount_minor, -850);
        assert_eq!(f.source_id.as_deref(), Some("77"));
    }

    #[test]
    fn source_id_with_spaces_survives() {
        let note = encode(150, Some("ref 42"));
        assert_eq!(note, "amount_minor=150,source_id=ref 42");
        assert_eq!(decode(&note).unwrap().source_id.as_deref(), Some("ref 42"));
    }

    #[test]
    fn decode_empty_source_id_is_absent() {
        assert_eq!(decode("amount_minor=1,source_id=").unwrap().source_id, None);
    }

    #[test]
    fn decode_rejects_missing_amount() {
        let err = decode("groceries").unwrap_err();
        assert!(matches!(err, SyncError::MalformedRemoteNote { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn decode_rejects_non_integer_amount() {
        assert!(decode("amount_minor=abc").is_err());
        assert!(decode("amount_minor=-").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn decode_rejects_overflowing_amount() {
        assert!(decode("amount_minor=99999999999999999999999").is_err());
    }

    proptest! {
        #[test]
        fn encoded_notes_decode_to_same_fields(
            amount in any::<i64>(),
            source in proptest::option::of("[A-Za-z0-9 _,=\\-]{1,16}"),
        ) {
            let note = encode(amount, source.as_deref());
            let fields = decode(&note).unwrap();
            prop_assert_eq!(fields.amount_minor, amount);
            prop_assert_eq!(fields.source_id, source);
        }
    }
}
