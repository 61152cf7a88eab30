//! Structural JSON diff and three-way merge.
//!
//! The diff half produces jsondiffpatch-style delta values; the patch
//! half merges two deltas against their common base with a precedence
//! label, using operational-transform patch application for plain-text
//! properties.

mod diff;
mod patch;
mod textdiff;

#[cfg(test)]
mod textdiff_test;

pub use diff::{DeltaKind, DiffOptions, apply_delta, delta_kind, diff};
pub use patch::{merge_deltas, merge_docs};
pub use textdiff::{
    DiffOp, Patch, diff_chars, merge_text, patch_apply, patch_from_text, patch_make,
    patch_to_text,
};
