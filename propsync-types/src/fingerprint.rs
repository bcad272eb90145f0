//! Canonical content fingerprints for property documents.
//!
//! A fingerprint is the SHA-256 digest of a document's canonical JSON form:
//! object keys ordered lexicographically at every nesting level, no
//! insignificant whitespace. Two documents that differ only in key insertion
//! order or formatting therefore hash identically, and the engine compares
//! fingerprints everywhere instead of deep-comparing documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical content hash of a record's document.
///
/// Stored and transported as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a document.
    ///
    /// Deterministic across process runs and key insertion order; never
    /// fails for JSON-representable input.
    #[must_use]
    pub fn of(document: &Value) -> Self {
        let mut buf = Vec::new();
        write_canonical(document, &mut buf);
        Self(hex::encode(Sha256::digest(&buf)))
    }

    /// Returns true if the two fingerprints denote different content.
    ///
    /// This is the engine's entire change detector: a pure equality check,
    /// never a document comparison.
    #[must_use]
    pub fn differs(&self, other: &Self) -> bool {
        self != other
    }

    /// Returns the hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses a fingerprint from its hex representation (e.g. a database
    /// column). Rejects anything that is not 64 lowercase hex characters.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::Error::InvalidFingerprint(s.to_string()))
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Writes the canonical JSON form of a value.
///
/// Objects are emitted with keys in lexicographic (byte) order, recursively.
/// Scalars and strings use serde_json's compact encoding so escaping and
/// number formatting stay consistent with ordinary serialization.
fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // Keys are plain strings; serialization cannot fail.
                serde_json::to_writer(&mut *out, key).expect("string serialization");
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => {
            serde_json::to_writer(&mut *out, scalar).expect("scalar serialization");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn nested_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"x":{"a":1,"b":[{"c":1,"d":2}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"x":{"b":[{"d":2,"c":1}],"a":1}}"#).unwrap();
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn array_order_matters() {
        let a = json!({"tags": ["pool", "garden"]});
        let b = json!({"tags": ["garden", "pool"]});
        assert!(Fingerprint::of(&a).differs(&Fingerprint::of(&b)));
    }

    #[test]
    fn value_change_changes_fingerprint() {
        let a = json!({"external_id": "P-1", "price": 100});
        let b = json!({"external_id": "P-1", "price": 101});
        assert!(Fingerprint::of(&a).differs(&Fingerprint::of(&b)));
    }

    #[test]
    fn parse_round_trip() {
        let fp = Fingerprint::of(&json!({"a": 1}));
        let parsed = Fingerprint::parse(fp.as_str()).unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Fingerprint::parse("not-a-hash").is_err());
        assert!(Fingerprint::parse(&"A".repeat(64)).is_err());
        assert!(Fingerprint::parse(&"a".repeat(63)).is_err());
    }
}
