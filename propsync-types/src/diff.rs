//! Shallow document diffing for conflict reporting.
//!
//! The engine decides whether two documents differ by fingerprint alone;
//! this diff exists purely so a conflicted record can be reported to a human
//! with the fields that drifted. It never drives sync decisions.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single top-level field difference between two documents.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// Present in the new document only.
    Added(Value),
    /// Present in the old document only.
    Removed(Value),
    /// Present in both with different values.
    Changed { old: Value, new: Value },
}

/// Compares two documents field by field at the top level.
///
/// Documents are JSON objects; any non-object side contributes no fields.
#[must_use]
pub fn document_diff(old: &Value, new: &Value) -> BTreeMap<String, FieldChange> {
    let empty = Map::new();
    let old = old.as_object().unwrap_or(&empty);
    let new = new.as_object().unwrap_or(&empty);

    let mut changes = BTreeMap::new();
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                changes.insert(key.clone(), FieldChange::Removed(old_value.clone()));
            }
            Some(new_value) if new_value != old_value => {
                changes.insert(
                    key.clone(),
                    FieldChange::Changed {
                        old: old_value.clone(),
                        new: new_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            changes.insert(key.clone(), FieldChange::Added(new_value.clone()));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_documents_have_no_diff() {
        let doc = json!({"a": 1, "b": "x"});
        assert!(document_diff(&doc, &doc).is_empty());
    }

    #[test]
    fn reports_added_removed_and_changed() {
        let old = json!({"price": 100, "city": "Valencia", "pool": true});
        let new = json!({"price": 120, "city": "Valencia", "floor": 3});

        let diff = document_diff(&old, &new);
        assert_eq!(
            diff.get("price"),
            Some(&FieldChange::Changed {
                old: json!(100),
                new: json!(120)
            })
        );
        assert_eq!(diff.get("pool"), Some(&FieldChange::Removed(json!(true))));
        assert_eq!(diff.get("floor"), Some(&FieldChange::Added(json!(3))));
        assert!(!diff.contains_key("city"));
    }

    #[test]
    fn non_object_sides_are_empty() {
        let diff = document_diff(&json!(null), &json!({"a": 1}));
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get("a"), Some(&FieldChange::Added(json!(1))));
    }
}
