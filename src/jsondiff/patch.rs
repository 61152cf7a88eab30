//! Three-way JSON merge over structural deltas.
//!
//! Merges two deltas derived from the same base document. Non-conflicting
//! property changes from both sides apply; conflicting changes on the
//! same property resolve by the strategy's precedence; plain-text
//! properties changed on both sides merge operational-transform style
//! over their patch hunks.

use serde_json::{Map, Value};

use super::diff::{DeltaKind, DiffOptions, apply_delta, delta_kind, diff};
use super::textdiff;

/// Merge `ours` and `theirs` against `base`, preferring the side named by
/// `prefer_ours` when property-level changes conflict.
///
/// `base` is absent when both sides inserted the document; the merge then
/// runs against an empty object.
pub fn merge_docs(
    base: Option<&Value>,
    ours: &Value,
    theirs: &Value,
    prefer_ours: bool,
    options: &DiffOptions,
) -> Value {
    let empty = Value::Object(Map::new());
    let base = base.unwrap_or(&empty);
    let ours_delta = diff(base, ours, options);
    let theirs_delta = diff(base, theirs, options);
    merge_deltas(base, ours_delta.as_ref(), theirs_delta.as_ref(), prefer_ours)
}

/// Merge two deltas against their shared base value.
pub fn merge_deltas(
    base: &Value,
    ours_delta: Option<&Value>,
    theirs_delta: Option<&Value>,
    prefer_ours: bool,
) -> Value {
    match (ours_delta, theirs_delta) {
        (None, None) => base.clone(),
        (Some(delta), None) | (None, Some(delta)) => {
            apply_delta(Some(base), delta).unwrap_or_else(|| Value::Object(Map::new()))
        }
        (Some(ours), Some(theirs)) => merge_node(base, ours, theirs, prefer_ours)
            .unwrap_or_else(|| Value::Object(Map::new())),
    }
}

/// Merge one delta node pair. `None` means both sides deleted the value.
fn merge_node(
    base: &Value,
    ours: &Value,
    theirs: &Value,
    prefer_ours: bool,
) -> Option<Value> {
    if ours == theirs {
        return apply_delta(Some(base), ours);
    }
    let (preferred, other) = if prefer_ours {
        (ours, theirs)
    } else {
        (theirs, ours)
    };

    match (delta_kind(ours), delta_kind(theirs)) {
        // Both sides descended into the same object.
        (Some(DeltaKind::Object), Some(DeltaKind::Object)) => {
            Some(merge_objects(base, ours, theirs, prefer_ours))
        }
        // Both sides patched the same plain-text property.
        (Some(DeltaKind::TextPatch), Some(DeltaKind::TextPatch)) => {
            let base_text = base.as_str().unwrap_or("");
            let first = preferred[0].as_str().and_then(textdiff::patch_from_text);
            let second = other[0].as_str().and_then(textdiff::patch_from_text);
            match (first, second) {
                (Some(first), Some(second)) => {
                    let merged = textdiff::patch_apply(
                        &second,
                        &textdiff::patch_apply(&first, base_text),
                    );
                    Some(Value::String(merged))
                }
                // Unparseable patch text: fall back to the preferred side.
                _ => apply_delta(Some(base), preferred),
            }
        }
        // Anything else on the same property is a conflict: the preferred
        // side's change wins whole.
        _ => apply_delta(Some(base), preferred),
    }
}

fn merge_objects(base: &Value, ours: &Value, theirs: &Value, prefer_ours: bool) -> Value {
    let empty = Map::new();
    let base_map = base.as_object().unwrap_or(&empty);
    let ours_map = ours.as_object().unwrap();
    let theirs_map = theirs.as_object().unwrap();

    let mut merged = base_map.clone();
    let mut keys: Vec<&String> = ours_map.keys().chain(theirs_map.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let base_child = base_map.get(key);
        let outcome = match (ours_map.get(key), theirs_map.get(key)) {
            (Some(ours_child), None) => apply_child(base_child, ours_child),
            (None, Some(theirs_child)) => apply_child(base_child, theirs_child),
            (Some(ours_child), Some(theirs_child)) => {
                let base_child = base_child.cloned().unwrap_or(Value::Null);
                merge_node(&base_child, ours_child, theirs_child, prefer_ours)
            }
            (None, None) => unreachable!("key came from one of the two maps"),
        };
        match outcome {
            Some(value) => {
                merged.insert(key.clone(), value);
            }
            None => {
                merged.remove(key);
            }
        }
    }
    Value::Object(merged)
}

fn apply_child(base: Option<&Value>, delta: &Value) -> Option<Value> {
    apply_delta(base, delta)
}
