//! Structural JSON diff.
//!
//! Produces a JSON delta value with per-property slots: `[new]` for an
//! addition, `[old, new]` for a replacement, `[old, 0, 0]` for a
//! deletion, `[patch, 0, 2]` for a plain-text patch and `["", dest, 3]`
//! for an array move. Nested objects recurse into nested delta maps;
//! arrays diff under a `{"_t": "a"}` marker, matched by LCS or, when
//! `id_of_subtree` is configured, by identity properties.

use serde_json::{Map, Value, json};

use super::textdiff;

/// Options steering the structural diff.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Properties that identify array elements, so element edits diff in
    /// place instead of deleting and re-inserting.
    pub id_of_subtree: Vec<String>,
    /// Mask of string properties diffed as plain text. An object tree
    /// whose leaves are `true`, mirroring the document shape.
    pub plain_text_properties: Option<Value>,
}

impl DiffOptions {
    /// Whether the property at `path` is marked as plain text.
    fn is_plain_text(&self, path: &[&str]) -> bool {
        let Some(mask) = &self.plain_text_properties else {
            return false;
        };
        let mut cursor = mask;
        for segment in path {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => return false,
            }
        }
        cursor.as_bool().unwrap_or(false)
    }
}

/// Diff two documents. Returns `None` when they are equal.
pub fn diff(old: &Value, new: &Value, options: &DiffOptions) -> Option<Value> {
    diff_at(old, new, &mut Vec::new(), options)
}

fn diff_at(
    old: &Value,
    new: &Value,
    path: &mut Vec<String>,
    options: &DiffOptions,
) -> Option<Value> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            object_diff(old_map, new_map, path, options)
        }
        (Value::Array(old_arr), Value::Array(new_arr)) => {
            array_diff(old_arr, new_arr, path, options)
        }
        (Value::String(old_text), Value::String(new_text)) => {
            let segments: Vec<&str> = path.iter().map(String::as_str).collect();
            if options.is_plain_text(&segments) {
                let patches = textdiff::patch_make(old_text, new_text);
                Some(json!([textdiff::patch_to_text(&patches), 0, 2]))
            } else {
                Some(json!([old, new]))
            }
        }
        _ => Some(json!([old, new])),
    }
}

fn object_diff(
    old_map: &Map<String, Value>,
    new_map: &Map<String, Value>,
    path: &mut Vec<String>,
    options: &DiffOptions,
) -> Option<Value> {
    let mut delta = Map::new();
    for (key, old_value) in old_map {
        match new_map.get(key) {
            None => {
                delta.insert(key.clone(), json!([old_value, 0, 0]));
            }
            Some(new_value) => {
                path.push(key.clone());
                if let Some(child) = diff_at(old_value, new_value, path, options) {
                    delta.insert(key.clone(), child);
                }
                path.pop();
            }
        }
    }
    for (key, new_value) in new_map {
        if !old_map.contains_key(key) {
            delta.insert(key.clone(), json!([new_value]));
        }
    }
    if delta.is_empty() {
        None
    } else {
        Some(Value::Object(delta))
    }
}

/// Identity of an array element under `id_of_subtree`, if it has one.
fn subtree_id(value: &Value, keys: &[String]) -> Option<Vec<Value>> {
    let obj = value.as_object()?;
    let mut id = Vec::with_capacity(keys.len());
    for key in keys {
        id.push(obj.get(key)?.clone());
    }
    Some(id)
}

fn array_diff(
    old_arr: &[Value],
    new_arr: &[Value],
    path: &mut Vec<String>,
    options: &DiffOptions,
) -> Option<Value> {
    let mut delta = Map::new();
    delta.insert("_t".to_string(), json!("a"));

    let keyed = !options.id_of_subtree.is_empty()
        && old_arr
            .iter()
            .chain(new_arr.iter())
            .all(|v| subtree_id(v, &options.id_of_subtree).is_some());

    if keyed {
        let old_ids: Vec<Vec<Value>> = old_arr
            .iter()
            .map(|v| subtree_id(v, &options.id_of_subtree).unwrap())
            .collect();
        let new_ids: Vec<Vec<Value>> = new_arr
            .iter()
            .map(|v| subtree_id(v, &options.id_of_subtree).unwrap())
            .collect();

        for (j, old_value) in old_arr.iter().enumerate() {
            match new_ids.iter().position(|id| *id == old_ids[j]) {
                None => {
                    delta.insert(format!("_{j}"), json!([old_value, 0, 0]));
                }
                Some(i) => {
                    if i != j {
                        delta.insert(format!("_{j}"), json!(["", i, 3]));
                    }
                    path.push(i.to_string());
                    if let Some(child) = diff_at(old_value, &new_arr[i], path, options) {
                        delta.insert(i.to_string(), child);
                    }
                    path.pop();
                }
            }
        }
        for (i, new_value) in new_arr.iter().enumerate() {
            if !old_ids.contains(&new_ids[i]) {
                delta.insert(i.to_string(), json!([new_value]));
            }
        }
    } else {
        // Unkeyed arrays match by deep equality through an LCS; changed
        // elements appear as a deletion plus an insertion.
        let lcs = lcs_pairs(old_arr, new_arr);
        let matched_old: Vec<usize> = lcs.iter().map(|(j, _)| *j).collect();
        let matched_new: Vec<usize> = lcs.iter().map(|(_, i)| *i).collect();
        for (j, old_value) in old_arr.iter().enumerate() {
            if !matched_old.contains(&j) {
                delta.insert(format!("_{j}"), json!([old_value, 0, 0]));
            }
        }
        for (i, new_value) in new_arr.iter().enumerate() {
            if !matched_new.contains(&i) {
                delta.insert(i.to_string(), json!([new_value]));
            }
        }
    }

    if delta.len() == 1 {
        None
    } else {
        Some(Value::Object(delta))
    }
}

/// Longest common subsequence as (old index, new index) pairs.
fn lcs_pairs(old_arr: &[Value], new_arr: &[Value]) -> Vec<(usize, usize)> {
    let n = old_arr.len();
    let m = new_arr.len();
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for j in (0..n).rev() {
        for i in (0..m).rev() {
            table[j][i] = if old_arr[j] == new_arr[i] {
                table[j + 1][i + 1] + 1
            } else {
                table[j + 1][i].max(table[j][i + 1])
            };
        }
    }
    let mut pairs = Vec::new();
    let (mut j, mut i) = (0, 0);
    while j < n && i < m {
        if old_arr[j] == new_arr[i] {
            pairs.push((j, i));
            j += 1;
            i += 1;
        } else if table[j + 1][i] >= table[j][i + 1] {
            j += 1;
        } else {
            i += 1;
        }
    }
    pairs
}

/// Kind of a delta node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Add,
    Replace,
    Delete,
    TextPatch,
    Move,
    Object,
    Array,
}

/// Classify a delta node.
pub fn delta_kind(delta: &Value) -> Option<DeltaKind> {
    match delta {
        Value::Array(slot) => match slot.len() {
            1 => Some(DeltaKind::Add),
            2 => Some(DeltaKind::Replace),
            3 => match slot[2].as_u64() {
                Some(0) => Some(DeltaKind::Delete),
                Some(2) => Some(DeltaKind::TextPatch),
                Some(3) => Some(DeltaKind::Move),
                _ => None,
            },
            _ => None,
        },
        Value::Object(map) => {
            if map.get("_t").and_then(Value::as_str) == Some("a") {
                Some(DeltaKind::Array)
            } else {
                Some(DeltaKind::Object)
            }
        }
        _ => None,
    }
}

/// Apply a delta to a value. Returns `None` when the delta deletes it.
pub fn apply_delta(value: Option<&Value>, delta: &Value) -> Option<Value> {
    match delta_kind(delta) {
        Some(DeltaKind::Add) => Some(delta[0].clone()),
        Some(DeltaKind::Replace) => Some(delta[1].clone()),
        Some(DeltaKind::Delete) => None,
        Some(DeltaKind::TextPatch) => {
            let base = value.and_then(Value::as_str).unwrap_or("");
            let patches = textdiff::patch_from_text(delta[0].as_str()?)?;
            Some(Value::String(textdiff::patch_apply(&patches, base)))
        }
        Some(DeltaKind::Move) => Some(delta.clone()),
        Some(DeltaKind::Object) => {
            let mut map = match value {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            for (key, child) in delta.as_object().unwrap() {
                match apply_delta(map.get(key), child) {
                    Some(applied) => {
                        map.insert(key.clone(), applied);
                    }
                    None => {
                        map.remove(key);
                    }
                }
            }
            Some(Value::Object(map))
        }
        Some(DeltaKind::Array) => {
            let items = match value {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            Some(Value::Array(apply_array_delta(
                items,
                delta.as_object().unwrap(),
            )))
        }
        None => value.cloned(),
    }
}

fn apply_array_delta(mut items: Vec<Value>, delta: &Map<String, Value>) -> Vec<Value> {
    // Removals and move sources first, from the highest index down.
    let mut removals: Vec<(usize, Option<usize>)> = Vec::new();
    for (key, child) in delta {
        if let Some(index) = key.strip_prefix('_').and_then(|s| s.parse::<usize>().ok()) {
            match delta_kind(child) {
                Some(DeltaKind::Delete) => removals.push((index, None)),
                Some(DeltaKind::Move) => {
                    removals.push((index, child[1].as_u64().map(|i| i as usize)));
                }
                _ => {}
            }
        }
    }
    removals.sort_by(|a, b| b.0.cmp(&a.0));
    let mut moved: Vec<(usize, Value)> = Vec::new();
    for (index, destination) in removals {
        if index < items.len() {
            let item = items.remove(index);
            if let Some(destination) = destination {
                moved.push((destination, item));
            }
        }
    }

    // Insertions and move targets, from the lowest index up.
    let mut insertions: Vec<(usize, Value)> = Vec::new();
    for (key, child) in delta {
        if key == "_t" || key.starts_with('_') {
            continue;
        }
        if let (Ok(index), Some(DeltaKind::Add)) = (key.parse::<usize>(), delta_kind(child)) {
            insertions.push((index, child[0].clone()));
        }
    }
    insertions.extend(moved);
    insertions.sort_by_key(|(index, _)| *index);
    for (index, item) in insertions {
        let index = index.min(items.len());
        items.insert(index, item);
    }

    // Nested edits last.
    for (key, child) in delta {
        if key == "_t" || key.starts_with('_') {
            continue;
        }
        if let Ok(index) = key.parse::<usize>() {
            if !matches!(delta_kind(child), Some(DeltaKind::Add)) && index < items.len() {
                if let Some(applied) = apply_delta(Some(&items[index]), child) {
                    items[index] = applied;
                }
            }
        }
    }
    items
}
