//! Changed-file enumeration and commit-log construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use git2::{Commit, Delta, Oid, Repository, Tree};

use crate::doc::FatDoc;
use crate::error::SyncError;
use crate::types::{ChangedFile, CommitIdentity, NormalizedCommit};

/// Read the document stored at `name` with blob `oid`.
pub fn read_fat_doc(repo: &Repository, name: &str, oid: Oid) -> Result<FatDoc, SyncError> {
    let blob = repo.find_blob(oid)?;
    FatDoc::from_blob(name, &oid.to_string(), blob.content())
}

/// Enumerate file-level changes between two trees.
///
/// `old_tree` of `None` diffs against the empty tree, so every file in
/// `new_tree` appears as an insertion.
pub fn get_changed_files(
    repo: &Repository,
    old_tree: Option<&Tree<'_>>,
    new_tree: &Tree<'_>,
) -> Result<Vec<ChangedFile>, SyncError> {
    let diff = repo.diff_tree_to_tree(old_tree, Some(new_tree), None)?;
    let mut changes = Vec::new();
    for delta in diff.deltas() {
        let status = delta.status();
        match status {
            Delta::Added => {
                let file = delta.new_file();
                let name = path_of(&file)?;
                changes.push(ChangedFile::Insert {
                    new: read_fat_doc(repo, &name, file.id())?,
                });
            }
            Delta::Deleted => {
                let file = delta.old_file();
                let name = path_of(&file)?;
                changes.push(ChangedFile::Delete {
                    old: read_fat_doc(repo, &name, file.id())?,
                });
            }
            Delta::Modified => {
                let old_file = delta.old_file();
                let new_file = delta.new_file();
                let name = path_of(&new_file)?;
                changes.push(ChangedFile::Update {
                    old: read_fat_doc(repo, &path_of(&old_file)?, old_file.id())?,
                    new: read_fat_doc(repo, &name, new_file.id())?,
                });
            }
            _ => {
                tracing::debug!(status = ?status, "Skipping non-document delta");
            }
        }
    }
    Ok(changes)
}

fn path_of(file: &git2::DiffFile<'_>) -> Result<String, SyncError> {
    file.path()
        .and_then(|p| p.to_str())
        .map(str::to_string)
        .ok_or_else(|| SyncError::InvalidDocType {
            name: String::from_utf8_lossy(file.path_bytes().unwrap_or(&[])).to_string(),
        })
}

/// Commits reachable from `head` but not from `base` or `remote`,
/// oldest first.
pub fn get_commit_logs(
    repo: &Repository,
    head: Oid,
    base: Option<Oid>,
    remote: Option<Oid>,
) -> Result<Vec<NormalizedCommit>, SyncError> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push(head)?;
    if let Some(base) = base {
        revwalk.hide(base)?;
    }
    if let Some(remote) = remote {
        revwalk.hide(remote)?;
    }
    let mut commits = Vec::new();
    for oid in revwalk {
        let commit = repo.find_commit(oid?)?;
        commits.push(normalize_commit(&commit));
    }
    commits.reverse();
    Ok(commits)
}

/// Serializable view of a commit.
pub fn normalize_commit(commit: &Commit<'_>) -> NormalizedCommit {
    let gpgsig = commit
        .header_field_bytes("gpgsig")
        .ok()
        .map(|buf| String::from_utf8_lossy(&buf).to_string());
    NormalizedCommit {
        oid: commit.id().to_string(),
        message: commit.message().unwrap_or("").to_string(),
        parent: commit.parent_ids().map(|oid| oid.to_string()).collect(),
        author: identity_of(&commit.author()),
        committer: identity_of(&commit.committer()),
        gpgsig,
    }
}

fn identity_of(signature: &git2::Signature<'_>) -> CommitIdentity {
    let timestamp = DateTime::<Utc>::from_timestamp(signature.when().seconds(), 0)
        .unwrap_or_else(Utc::now);
    CommitIdentity {
        name: signature.name().unwrap_or("").to_string(),
        email: signature.email().unwrap_or("").to_string(),
        timestamp,
    }
}

/// Flatten a tree into `path -> blob oid`, recursing into sub-trees.
pub fn flatten_tree(repo: &Repository, tree: &Tree<'_>) -> Result<BTreeMap<String, Oid>, SyncError> {
    let mut entries = BTreeMap::new();
    collect_tree(repo, tree, "", &mut entries)?;
    Ok(entries)
}

fn collect_tree(
    repo: &Repository,
    tree: &Tree<'_>,
    prefix: &str,
    entries: &mut BTreeMap<String, Oid>,
) -> Result<(), SyncError> {
    for entry in tree.iter() {
        let name = entry.name().unwrap_or_default();
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };
        match entry.kind() {
            Some(git2::ObjectType::Tree) => {
                let subtree = repo.find_tree(entry.id())?;
                collect_tree(repo, &subtree, &path, entries)?;
            }
            Some(git2::ObjectType::Blob) => {
                entries.insert(path, entry.id());
            }
            _ => {}
        }
    }
    Ok(())
}
