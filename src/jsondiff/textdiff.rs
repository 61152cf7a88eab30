//! Character-level text diff and fuzzy patch application.
//!
//! Produces unified-diff-style patch text for string properties marked as
//! plain text, and applies such patches with positional fuzz so two
//! independently derived patch sets can be merged operational-transform
//! style. Offsets are character offsets, not byte offsets.

/// One edit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Equal,
    Delete,
    Insert,
}

/// Contextual margin kept around each hunk, in characters.
const PATCH_MARGIN: usize = 4;

/// Edit-distance cap: beyond this the diff degrades to replace-all.
const MAX_EDIT_DISTANCE: usize = 1_000;

/// A single patch hunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Start offset in the source text.
    pub start1: usize,
    /// Start offset in the target text.
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
    pub diffs: Vec<(DiffOp, String)>,
}

/// Compute a character diff between two strings.
pub fn diff_chars(old: &str, new: &str) -> Vec<(DiffOp, String)> {
    let old: Vec<char> = old.chars().collect();
    let new: Vec<char> = new.chars().collect();

    // Common prefix / suffix shrink the quadratic core.
    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let core_old = &old[prefix..old.len() - suffix];
    let core_new = &new[prefix..new.len() - suffix];

    let mut diffs = Vec::new();
    if prefix > 0 {
        diffs.push((DiffOp::Equal, old[..prefix].iter().collect()));
    }
    diffs.extend(myers(core_old, core_new));
    if suffix > 0 {
        diffs.push((DiffOp::Equal, old[old.len() - suffix..].iter().collect()));
    }
    coalesce(diffs)
}

/// Myers O(ND) diff with backtracking over the stored V arrays.
fn myers(old: &[char], new: &[char]) -> Vec<(DiffOp, String)> {
    if old.is_empty() && new.is_empty() {
        return Vec::new();
    }
    if old.is_empty() {
        return vec![(DiffOp::Insert, new.iter().collect())];
    }
    if new.is_empty() {
        return vec![(DiffOp::Delete, old.iter().collect())];
    }

    let n = old.len() as isize;
    let m = new.len() as isize;
    let max = (n + m).min(MAX_EDIT_DISTANCE as isize);
    let offset = max;
    let width = (2 * max + 1) as usize;
    let mut v = vec![0isize; width];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    let mut found = false;
    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                trace.push(v.clone());
                found = true;
                break 'outer;
            }
            k += 2;
        }
    }

    if !found {
        // Distance cap exceeded: degrade to wholesale replacement.
        return vec![
            (DiffOp::Delete, old.iter().collect()),
            (DiffOp::Insert, new.iter().collect()),
        ];
    }

    // Backtrack from (n, m) through the recorded rounds.
    let mut edits: Vec<(DiffOp, char)> = Vec::new();
    let mut x = n;
    let mut y = m;
    for d in (0..trace.len() as isize - 1).rev() {
        let v = &trace[d as usize];
        let k = x - y;
        let idx = (k + offset) as usize;
        let (prev_k, went_down) = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            (k + 1, true)
        } else {
            (k - 1, false)
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            edits.push((DiffOp::Equal, old[x as usize]));
        }
        if d > 0 {
            if went_down {
                y -= 1;
                edits.push((DiffOp::Insert, new[y as usize]));
            } else {
                x -= 1;
                edits.push((DiffOp::Delete, old[x as usize]));
            }
        }
    }
    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        edits.push((DiffOp::Equal, old[x as usize]));
    }

    edits.reverse();
    let mut diffs: Vec<(DiffOp, String)> = Vec::new();
    for (op, ch) in edits {
        match diffs.last_mut() {
            Some((last_op, text)) if *last_op == op => text.push(ch),
            _ => diffs.push((op, ch.to_string())),
        }
    }
    coalesce(diffs)
}

fn coalesce(diffs: Vec<(DiffOp, String)>) -> Vec<(DiffOp, String)> {
    let mut out: Vec<(DiffOp, String)> = Vec::new();
    for (op, text) in diffs {
        if text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some((last_op, last_text)) if *last_op == op => last_text.push_str(&text),
            _ => out.push((op, text)),
        }
    }
    out
}

/// Build patch hunks from a diff of `old` against `new`.
pub fn patch_make(old: &str, new: &str) -> Vec<Patch> {
    let diffs = diff_chars(old, new);
    let mut patches = Vec::new();
    let mut patch = Patch {
        start1: 0,
        start2: 0,
        length1: 0,
        length2: 0,
        diffs: Vec::new(),
    };
    let mut char_count1 = 0usize;
    let mut char_count2 = 0usize;
    let mut in_hunk = false;

    for (i, (op, text)) in diffs.iter().enumerate() {
        let len = text.chars().count();
        match op {
            DiffOp::Equal => {
                if in_hunk {
                    if len <= 2 * PATCH_MARGIN && i != diffs.len() - 1 {
                        // Small gap: keep the hunk open.
                        patch.diffs.push((DiffOp::Equal, text.clone()));
                        patch.length1 += len;
                        patch.length2 += len;
                    } else {
                        // Close the hunk with trailing context.
                        let margin: String = text.chars().take(PATCH_MARGIN).collect();
                        let margin_len = margin.chars().count();
                        if margin_len > 0 {
                            patch.diffs.push((DiffOp::Equal, margin));
                            patch.length1 += margin_len;
                            patch.length2 += margin_len;
                        }
                        patches.push(patch.clone());
                        patch.diffs.clear();
                        in_hunk = false;
                    }
                }
            }
            DiffOp::Delete | DiffOp::Insert => {
                if !in_hunk {
                    in_hunk = true;
                    // Open the hunk with leading context from the
                    // preceding equality.
                    let (context, context_len) = match diffs.get(i.wrapping_sub(1)) {
                        Some((DiffOp::Equal, prev)) if i > 0 => {
                            let chars: Vec<char> = prev.chars().collect();
                            let take = chars.len().min(PATCH_MARGIN);
                            let context: String =
                                chars[chars.len() - take..].iter().collect();
                            (context, take)
                        }
                        _ => (String::new(), 0),
                    };
                    patch.start1 = char_count1 - context_len;
                    patch.start2 = char_count2 - context_len;
                    patch.length1 = context_len;
                    patch.length2 = context_len;
                    if context_len > 0 {
                        patch.diffs.push((DiffOp::Equal, context));
                    }
                }
                patch.diffs.push((*op, text.clone()));
                if *op == DiffOp::Delete {
                    patch.length1 += len;
                } else {
                    patch.length2 += len;
                }
            }
        }
        if *op != DiffOp::Insert {
            char_count1 += len;
        }
        if *op != DiffOp::Delete {
            char_count2 += len;
        }
    }
    if in_hunk && !patch.diffs.is_empty() {
        patches.push(patch);
    }
    patches
}

fn encode(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            c if (c as u32) < 0x20 => out.push_str(&format!("%{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn decode(text: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '%' && i + 2 < chars.len() {
            let hex: String = chars[i + 1..i + 3].iter().collect();
            if let Ok(code) = u32::from_str_radix(&hex, 16) {
                if let Some(ch) = char::from_u32(code) {
                    out.push(ch);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Serialize patches to unified-diff-style text.
pub fn patch_to_text(patches: &[Patch]) -> String {
    let mut out = String::new();
    for patch in patches {
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            patch.start1 + 1,
            patch.length1,
            patch.start2 + 1,
            patch.length2
        ));
        for (op, text) in &patch.diffs {
            let sigil = match op {
                DiffOp::Equal => ' ',
                DiffOp::Delete => '-',
                DiffOp::Insert => '+',
            };
            out.push(sigil);
            out.push_str(&encode(text));
            out.push('\n');
        }
    }
    out
}

/// Parse patch text produced by [`patch_to_text`].
pub fn patch_from_text(text: &str) -> Option<Vec<Patch>> {
    let mut patches = Vec::new();
    let mut current: Option<Patch> = None;
    for line in text.lines() {
        if let Some(header) = line.strip_prefix("@@ -") {
            if let Some(patch) = current.take() {
                patches.push(patch);
            }
            let header = header.strip_suffix(" @@")?;
            let (old_part, new_part) = header.split_once(" +")?;
            let (s1, l1) = old_part.split_once(',')?;
            let (s2, l2) = new_part.split_once(',')?;
            current = Some(Patch {
                start1: s1.parse::<usize>().ok()?.saturating_sub(1),
                start2: s2.parse::<usize>().ok()?.saturating_sub(1),
                length1: l1.parse().ok()?,
                length2: l2.parse().ok()?,
                diffs: Vec::new(),
            });
        } else if let Some(patch) = current.as_mut() {
            let mut chars = line.chars();
            let op = match chars.next() {
                Some(' ') => DiffOp::Equal,
                Some('-') => DiffOp::Delete,
                Some('+') => DiffOp::Insert,
                _ => return None,
            };
            patch.diffs.push((op, decode(chars.as_str())));
        } else {
            return None;
        }
    }
    if let Some(patch) = current.take() {
        patches.push(patch);
    }
    Some(patches)
}

/// Apply patches to `text` with positional fuzz.
///
/// Each hunk is matched first at its expected offset, then by searching
/// for its source text nearest to that offset. Hunks whose source text no
/// longer exists are dropped.
pub fn patch_apply(patches: &[Patch], text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut delta: isize = 0;

    for patch in patches {
        let source: Vec<char> = patch
            .diffs
            .iter()
            .filter(|(op, _)| *op != DiffOp::Insert)
            .flat_map(|(_, t)| t.chars())
            .collect();
        let target: Vec<char> = patch
            .diffs
            .iter()
            .filter(|(op, _)| *op != DiffOp::Delete)
            .flat_map(|(_, t)| t.chars())
            .collect();

        let expected = (patch.start1 as isize + delta).max(0) as usize;
        let position = match find_near(&chars, &source, expected) {
            Some(position) => position,
            None => continue,
        };
        chars.splice(position..position + source.len(), target.iter().copied());
        delta += target.len() as isize - source.len() as isize;
    }
    chars.into_iter().collect()
}

/// Locate `needle` in `haystack` as close as possible to `expected`.
fn find_near(haystack: &[char], needle: &[char], expected: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(expected.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    let matches_at = |pos: usize| haystack[pos..pos + needle.len()] == *needle;

    let limit = haystack.len() - needle.len();
    if expected <= limit && matches_at(expected) {
        return Some(expected);
    }
    for distance in 1..=limit.max(expected) {
        if expected >= distance && expected - distance <= limit && matches_at(expected - distance)
        {
            return Some(expected - distance);
        }
        if expected + distance <= limit && matches_at(expected + distance) {
            return Some(expected + distance);
        }
    }
    None
}

/// Three-way text merge over patch hunks.
///
/// The preferred side's patches are applied first; the other side's
/// non-overlapping hunks then apply on top, and its overlapping hunks are
/// dropped because their context no longer matches.
pub fn merge_text(base: &str, ours: &str, theirs: &str, prefer_ours: bool) -> String {
    let ours_patches = patch_make(base, ours);
    let theirs_patches = patch_make(base, theirs);
    let (first, second) = if prefer_ours {
        (ours_patches, theirs_patches)
    } else {
        (theirs_patches, ours_patches)
    };
    patch_apply(&second, &patch_apply(&first, base))
}
