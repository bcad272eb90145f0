use propsync_types::Fingerprint;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// ── Determinism ───────────────────────────────────────────────────

#[test]
fn fingerprint_is_stable_across_calls() {
    let doc = json!({"external_id": "P-1", "price": 100, "features": ["pool"]});
    assert_eq!(Fingerprint::of(&doc), Fingerprint::of(&doc));
}

#[test]
fn fingerprint_matches_known_shape() {
    let fp = Fingerprint::of(&json!({}));
    assert_eq!(fp.as_str().len(), 64);
    assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn whitespace_in_input_text_is_irrelevant() {
    let a: Value = serde_json::from_str(r#"{"a": 1, "b": [1, 2]}"#).unwrap();
    let b: Value = serde_json::from_str(r#"{"a":1,"b":[1,2]}"#).unwrap();
    assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
}

// ── Key-order invariance ──────────────────────────────────────────

/// Generates arbitrary JSON documents a few levels deep.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Rebuilds an object with its keys inserted in reverse order, recursively.
fn reverse_key_order(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut reversed = Map::new();
            for (k, v) in map.iter().rev() {
                reversed.insert(k.clone(), reverse_key_order(v));
            }
            Value::Object(reversed)
        }
        Value::Array(items) => Value::Array(items.iter().map(reverse_key_order).collect()),
        other => other.clone(),
    }
}

proptest! {
    #[test]
    fn fingerprint_invariant_to_key_insertion_order(doc in arb_json()) {
        let reordered = reverse_key_order(&doc);
        prop_assert_eq!(Fingerprint::of(&doc), Fingerprint::of(&reordered));
    }

    #[test]
    fn serde_roundtrip_preserves_fingerprint(doc in arb_json()) {
        let text = serde_json::to_string(&doc).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(Fingerprint::of(&doc), Fingerprint::of(&parsed));
    }
}
