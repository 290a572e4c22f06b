#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property-based tests for frame normalization.
//!
//! Uses proptest to verify:
//! 1. A record with a `timestamp` keeps that exact value.
//! 2. A record without one receives the server time.
//! 3. Normalizing twice is the same as normalizing once.
//! 4. Random text never causes a panic (returns `Err` gracefully).
//! 5. Binary frames are never modified.

use proptest::prelude::*;
use roomcast_proto::frame::{Frame, NormalizeError, TIMESTAMP_FIELD, Timestamp, normalize};
use serde_json::{Map, Value};

/// Strategy for flat JSON scalar values.
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[^\x00]{0,32}".prop_map(Value::from),
    ]
}

/// Strategy for flat records that never contain a `timestamp` key.
fn arb_record_without_timestamp() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::vec(("[a-z]{1,8}", arb_scalar()), 0..8).prop_map(|fields| {
        fields
            .into_iter()
            .filter(|(k, _)| k != TIMESTAMP_FIELD)
            .collect()
    })
}

fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    (0u64..4_102_444_800_000).prop_map(Timestamp::from_millis)
}

fn record_of(frame: &Frame) -> Map<String, Value> {
    frame.parse_record().unwrap()
}

proptest! {
    #[test]
    fn missing_timestamp_is_injected(
        record in arb_record_without_timestamp(),
        now in arb_timestamp(),
    ) {
        let input = Frame::Text(serde_json::to_string(&record).unwrap());
        let out = normalize(input, now).unwrap();
        let stored = record_of(&out);
        prop_assert_eq!(stored.get(TIMESTAMP_FIELD), Some(&Value::from(now.as_millis())));
        prop_assert_eq!(stored.len(), record.len() + 1);
    }

    #[test]
    fn existing_timestamp_is_preserved(
        mut record in arb_record_without_timestamp(),
        sent in any::<u64>(),
        now in arb_timestamp(),
    ) {
        record.insert(TIMESTAMP_FIELD.to_string(), Value::from(sent));
        let input = Frame::Text(serde_json::to_string(&record).unwrap());
        let out = normalize(input, now).unwrap();
        let stored = record_of(&out);
        prop_assert_eq!(stored.get(TIMESTAMP_FIELD), Some(&Value::from(sent)));
    }

    #[test]
    fn normalization_is_idempotent(
        record in arb_record_without_timestamp(),
        first in arb_timestamp(),
        second in arb_timestamp(),
    ) {
        let input = Frame::Text(serde_json::to_string_pretty(&record).unwrap());
        let once = normalize(input, first).unwrap();
        let twice = normalize(once.clone(), second).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn random_text_never_panics(text in ".{0,256}") {
        match normalize(Frame::Text(text), Timestamp::now()) {
            Ok(Frame::Text(_))
            | Err(NormalizeError::MalformedPayload(_) | NormalizeError::NotARecord(_)) => {}
            other => prop_assert!(false, "unexpected result {:?}", other),
        }
    }

    #[test]
    fn binary_is_opaque(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let frame = Frame::Binary(bytes);
        let out = normalize(frame.clone(), Timestamp::now()).unwrap();
        prop_assert_eq!(out, frame);
    }
}
