//! Thin utility layer over the Git object store.
//!
//! Wraps the libgit2 primitives the workers need: repository bootstrap,
//! ref resolution, tree flattening and diffing, commit-log construction
//! and working-tree file I/O. Everything here is synchronous; the workers
//! call it from inside serialized tasks.

mod changes;
mod files;
mod repo;

#[cfg(test)]
mod changes_test;
#[cfg(test)]
mod repo_test;

pub use changes::{
    flatten_tree, get_changed_files, get_commit_logs, normalize_commit, read_fat_doc,
};
pub use files::{add_to_index, remove_from_index, remove_working_file, write_working_file};
pub use repo::{
    DEFAULT_BRANCH, checkout_head, current_branch, fast_forward, first_commit_oid, head_commit,
    open, open_or_init, resolve_tracking, set_tracking_ref,
};
