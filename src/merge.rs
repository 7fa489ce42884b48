//! Partial-patch merging for room documents.
//!
//! The service boundary historically merges shallowly: a top-level key in
//! the patch replaces the stored key wholesale, nested siblings included.
//! Callers that send partial nested patches need `Deep` instead, so the
//! strategy is an explicit parameter rather than a guess.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Shallow,
    Deep,
}

/// Apply `patch` onto `base` with the given strategy. `base` must be a JSON
/// object; non-object patches are ignored.
pub fn merge(base: &mut Value, patch: Value, strategy: MergeStrategy) {
    match strategy {
        MergeStrategy::Shallow => shallow_merge(base, patch),
        MergeStrategy::Deep => deep_merge(base, patch),
    }
}

/// Overwrite top-level keys wholesale.
pub fn shallow_merge(base: &mut Value, patch: Value) {
    if let (Value::Object(base_map), Value::Object(patch_map)) = (base, patch) {
        for (key, value) in patch_map {
            base_map.insert(key, value);
        }
    }
}

/// Recurse into nested objects so sibling keys survive a partial patch.
/// Arrays and scalars still replace wholesale; `null` overwrites (it is how
/// callers clear a field, e.g. `currentQuestion: null`).
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
