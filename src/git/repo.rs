//! Repository bootstrap and ref plumbing.

use std::path::Path;

use git2::{Commit, Oid, Repository, RepositoryInitOptions, Signature, build::CheckoutBuilder};

use crate::error::SyncError;

/// Branch used for new repositories.
pub const DEFAULT_BRANCH: &str = "main";

/// Open an existing repository.
pub fn open(working_dir: &Path) -> Result<Repository, SyncError> {
    Repository::open(working_dir).map_err(|_| SyncError::RepositoryNotOpen)
}

/// Open the repository at `working_dir`, initializing it with an empty
/// initial commit on [`DEFAULT_BRANCH`] when absent.
pub fn open_or_init(
    working_dir: &Path,
    author_name: &str,
    author_email: &str,
) -> Result<Repository, SyncError> {
    if working_dir.join(".git").exists() {
        return open(working_dir);
    }
    std::fs::create_dir_all(working_dir).map_err(|err| SyncError::CannotCreateDirectory {
        path: working_dir.display().to_string(),
        message: err.to_string(),
    })?;

    let mut init_options = RepositoryInitOptions::new();
    init_options.initial_head(&format!("refs/heads/{DEFAULT_BRANCH}"));
    let repo = Repository::init_opts(working_dir, &init_options)?;
    {
        let signature = Signature::now(author_name, author_email)?;
        let tree_oid = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        repo.commit(Some("HEAD"), &signature, &signature, "first commit", &tree, &[])?;
    }
    tracing::info!(path = %working_dir.display(), "Initialized repository");
    Ok(repo)
}

/// Name of the branch HEAD points at.
pub fn current_branch(repo: &Repository) -> Result<String, SyncError> {
    let head = repo.head()?;
    Ok(head.shorthand().unwrap_or(DEFAULT_BRANCH).to_string())
}

/// The commit HEAD points at, or `None` on an unborn branch.
pub fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, SyncError> {
    match repo.head() {
        Ok(head) => Ok(head.peel_to_commit().ok()),
        Err(err) if err.code() == git2::ErrorCode::UnbornBranch => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Resolve the tracking ref `refs/remotes/<remote_name>/<branch>`.
pub fn resolve_tracking(repo: &Repository, remote_name: &str, branch: &str) -> Option<Oid> {
    repo.find_reference(&format!("refs/remotes/{remote_name}/{branch}"))
        .ok()
        .and_then(|reference| reference.target())
}

/// Point the tracking ref at `oid`.
pub fn set_tracking_ref(
    repo: &Repository,
    remote_name: &str,
    branch: &str,
    oid: Oid,
) -> Result<(), SyncError> {
    repo.reference(
        &format!("refs/remotes/{remote_name}/{branch}"),
        oid,
        true,
        "update tracking ref",
    )?;
    Ok(())
}

/// Oid of the root commit reachable from `head`.
pub fn first_commit_oid(repo: &Repository, head: Oid) -> Result<Oid, SyncError> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push(head)?;
    let mut last = head;
    for oid in revwalk {
        last = oid?;
    }
    Ok(last)
}

/// Advance the branch ref to `target` and make the working tree match.
pub fn fast_forward(repo: &Repository, branch: &str, target: Oid) -> Result<(), SyncError> {
    repo.reference(
        &format!("refs/heads/{branch}"),
        target,
        true,
        "fast-forward",
    )?;
    checkout_head(repo)
}

/// Force the working tree and index to the current HEAD tree.
pub fn checkout_head(repo: &Repository) -> Result<(), SyncError> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))?;
    Ok(())
}
