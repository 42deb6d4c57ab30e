//! Property-Based Tests for Protocol Module
//!
//! Uses proptest to check the codec and TTL properties over generated inputs.

use proptest::prelude::*;
use serde_json::Value;

use crate::protocol::{decode, encode, normalize_at, parse_duration_ms, CorrelationId, Expiry, Frame};

// == Strategies ==
/// Generates arbitrary JSON values up to a small depth.
fn json_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _\\-\"\\\\]{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Generates `(amount, unit, factor)` triples for the duration grammar.
fn duration_strategy() -> impl Strategy<Value = (u32, &'static str, u64)> {
    let unit = prop_oneof![
        Just(("ms", 1u64)),
        Just((" seconds", 1_000)),
        Just(("s", 1_000)),
        Just((" min", 60_000)),
        Just(("h", 3_600_000)),
        Just((" days", 86_400_000)),
    ];
    (0u32..10_000, unit).prop_map(|(amount, (unit, factor))| (amount, unit, factor))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Any JSON value survives encode then decode unchanged.
    #[test]
    fn prop_envelope_roundtrip(value in json_value_strategy()) {
        let encoded = encode(&value).unwrap();
        prop_assert!(!encoded.is_empty());

        let decoded: Value = decode(&encoded).unwrap();
        prop_assert_eq!(decoded, value);
    }

    // The envelope string also survives being nested in a frame's data field.
    #[test]
    fn prop_envelope_survives_frame_nesting(value in json_value_strategy(), key in "[a-z]{1,16}") {
        let frame = Frame::set(CorrelationId::generate(), &key, encode(&value).unwrap(), 1);
        let parsed = Frame::parse(&frame.to_text().unwrap()).unwrap();

        let decoded: Value = decode(parsed.data.as_deref().unwrap()).unwrap();
        prop_assert_eq!(decoded, value);
    }

    // Numeric expiries are added to `now` verbatim.
    #[test]
    fn prop_normalize_millis(now in 0u64..4_000_000_000_000, ms in 0u64..1_000_000_000) {
        prop_assert_eq!(normalize_at(&Expiry::Millis(ms), now).unwrap(), now + ms);
    }

    // Human durations scale by their unit.
    #[test]
    fn prop_normalize_human((amount, unit, factor) in duration_strategy(), now in 0u64..4_000_000_000_000) {
        let text = format!("{amount}{unit}");
        prop_assert_eq!(parse_duration_ms(&text).unwrap(), u64::from(amount) * factor);
        prop_assert_eq!(
            normalize_at(&Expiry::Human(text), now).unwrap(),
            now + u64::from(amount) * factor
        );
    }
}
