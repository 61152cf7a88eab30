//! Push worker.
//!
//! Classifies the local head against the remote tracking ref, invokes the
//! remote engine's push, and computes the change set the remote observes.

use std::sync::Arc;

use git2::Oid;

use crate::error::SyncError;
use crate::git;
use crate::options::SyncDirection;
use crate::types::{ChangeSets, CommitSets, SyncResult};

use super::context::WorkerContext;

/// Run one push cycle.
///
/// `after_merge` skips remote change-set computation: the caller already
/// assembled it from the merge outcome.
pub async fn push_worker(
    ctx: Arc<WorkerContext>,
    after_merge: bool,
) -> Result<SyncResult, SyncError> {
    if ctx.options.sync_direction == SyncDirection::Pull {
        return Err(SyncError::PushNotAllowed);
    }

    // Snapshot head and tracking state; no repository handle may be held
    // across the transport await below.
    let (branch, head_oid, remote_oid, base_oid) = {
        let repo = git::open(&ctx.working_dir)?;
        let branch = git::current_branch(&repo)?;
        let head = git::head_commit(&repo)?.ok_or(SyncError::RepositoryNotOpen)?;
        let head_oid = head.id();
        let remote_oid = git::resolve_tracking(&repo, &ctx.remote_name, &branch);
        let base_oid = match remote_oid {
            None => git::first_commit_oid(&repo, head_oid)?,
            Some(remote_oid) => repo
                .merge_base(head_oid, remote_oid)
                .map_err(|_| SyncError::NoMergeBaseFound)?,
        };
        (branch, head_oid, remote_oid, base_oid)
    };

    tracing::debug!(
        remote = %ctx.remote_name,
        head = %head_oid,
        tracking = ?remote_oid,
        "Pushing"
    );

    match ctx
        .engine
        .push(&ctx.working_dir, &ctx.options, &ctx.remote_name, &branch, &branch)
        .await
    {
        Ok(()) => {}
        Err(err) => {
            // Losing a push race against our own commit is a no-op.
            if err.name() == "UnfetchedCommitExists" && remote_oid == Some(head_oid) {
                return Ok(SyncResult::Nop);
            }
            return Err(err.into());
        }
    }

    let repo = git::open(&ctx.working_dir)?;
    git::set_tracking_ref(&repo, &ctx.remote_name, &branch, head_oid)?;

    let remote_changes = if after_merge {
        Vec::new()
    } else {
        let head_commit = repo.find_commit(head_oid)?;
        let old_tree = match remote_oid {
            Some(oid) => Some(repo.find_commit(oid)?.tree()?),
            None => None,
        };
        git::get_changed_files(&repo, old_tree.as_ref(), &head_commit.tree()?)?
    };

    let commits = build_commits(&ctx, &repo, head_oid, base_oid, remote_oid)?;

    Ok(SyncResult::Push {
        changes: ChangeSets {
            local: Vec::new(),
            remote: remote_changes,
        },
        commits,
    })
}

fn build_commits(
    ctx: &WorkerContext,
    repo: &git2::Repository,
    head_oid: Oid,
    base_oid: Oid,
    remote_oid: Option<Oid>,
) -> Result<Option<CommitSets>, SyncError> {
    if !ctx.options.include_commits {
        return Ok(None);
    }
    Ok(Some(CommitSets {
        local: Vec::new(),
        remote: git::get_commit_logs(repo, head_oid, Some(base_oid), remote_oid)?,
    }))
}
