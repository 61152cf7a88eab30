use crate::jsondiff::{
    DiffOp, diff_chars, merge_text, patch_apply, patch_from_text, patch_make, patch_to_text,
};

#[test]
fn test_diff_equal_strings() {
    let diffs = diff_chars("same", "same");
    assert_eq!(diffs, vec![(DiffOp::Equal, "same".to_string())]);
}

#[test]
fn test_diff_insert_and_delete() {
    let diffs = diff_chars("hello world", "hello brave world");
    assert_eq!(
        diffs,
        vec![
            (DiffOp::Equal, "hello ".to_string()),
            (DiffOp::Insert, "brave ".to_string()),
            (DiffOp::Equal, "world".to_string()),
        ]
    );

    let diffs = diff_chars("abcdef", "abef");
    assert_eq!(
        diffs,
        vec![
            (DiffOp::Equal, "ab".to_string()),
            (DiffOp::Delete, "cd".to_string()),
            (DiffOp::Equal, "ef".to_string()),
        ]
    );
}

#[test]
fn test_diff_from_empty() {
    assert_eq!(
        diff_chars("", "new"),
        vec![(DiffOp::Insert, "new".to_string())]
    );
    assert_eq!(
        diff_chars("old", ""),
        vec![(DiffOp::Delete, "old".to_string())]
    );
}

#[test]
fn test_patch_apply_reproduces_target() {
    let cases = [
        ("hello world", "hello brave world"),
        ("the quick brown fox", "the slow brown cat"),
        ("", "from nothing"),
        ("multi\nline\ntext", "multi\nline\nedited\ntext"),
        ("unicode: héllo wörld", "unicode: héllo wörld!"),
    ];
    for (old, new) in cases {
        let patches = patch_make(old, new);
        assert_eq!(patch_apply(&patches, old), new, "{old:?} -> {new:?}");
    }
}

#[test]
fn test_patch_text_round_trip() {
    let patches = patch_make("line one\nline two\n", "line one\nline 2!\n");
    let text = patch_to_text(&patches);
    let parsed = patch_from_text(&text).unwrap();
    assert_eq!(parsed, patches);
    assert_eq!(patch_apply(&parsed, "line one\nline two\n"), "line one\nline 2!\n");
}

#[test]
fn test_patch_text_escapes_control_characters() {
    let patches = patch_make("a%b\nc", "a%B\nc");
    let text = patch_to_text(&patches);
    assert!(text.contains("%25"), "{text}");
    let parsed = patch_from_text(&text).unwrap();
    assert_eq!(patch_apply(&parsed, "a%b\nc"), "a%B\nc");
}

#[test]
fn test_patch_apply_with_shifted_position() {
    // The patch was made against the original, but the text gained a
    // prefix; the hunk must still find its context.
    let patches = patch_make("abc def ghi", "abc def ghiX");
    let shifted = "0123456789 abc def ghi";
    assert_eq!(patch_apply(&patches, shifted), "0123456789 abc def ghiX");
}

#[test]
fn test_patch_apply_drops_unmatchable_hunk() {
    let patches = patch_make("alpha beta", "alpha BETA");
    assert_eq!(patch_apply(&patches, "gamma delta"), "gamma delta");
}

#[test]
fn test_merge_disjoint_edits() {
    let base = "abc def ghi";
    let ours = "abcX def ghi";
    let theirs = "abc def ghiY";
    assert_eq!(merge_text(base, ours, theirs, true), "abcX def ghiY");
    assert_eq!(merge_text(base, ours, theirs, false), "abcX def ghiY");
}

#[test]
fn test_merge_conflicting_edits_prefers_one_side() {
    let base = "name: A, rest unchanged";
    let ours = "name: B, rest unchanged";
    let theirs = "name: C, rest unchanged";
    assert_eq!(merge_text(base, ours, theirs, true), ours);
    assert_eq!(merge_text(base, ours, theirs, false), theirs);
}
