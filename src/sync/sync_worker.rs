//! Sync worker.
//!
//! One full cycle: fetch, classify the divergence between local and
//! remote heads, then fast-forward, push, or run the three-way merge and
//! push the merge commit.

use std::sync::Arc;

use git2::{Oid, Signature};

use crate::error::SyncError;
use crate::git;
use crate::options::SyncDirection;
use crate::types::{ChangeSets, CommitSets, NormalizedCommit, SyncResult};

use super::context::WorkerContext;
use super::merge;
use super::push_worker::push_worker;

/// How the local head relates to the remote head after a fetch.
enum Divergence {
    Nop,
    FastForward { local_oid: Oid, remote_oid: Oid },
    PushOnly,
    Merge { base_oid: Oid, local_oid: Oid, remote_oid: Oid },
}

/// Run one sync cycle.
pub async fn sync_worker(ctx: Arc<WorkerContext>) -> Result<SyncResult, SyncError> {
    let branch = {
        let repo = git::open(&ctx.working_dir)?;
        git::current_branch(&repo)?
    };

    ctx.engine
        .fetch(&ctx.working_dir, &ctx.options, &ctx.remote_name, &branch, &branch)
        .await?;

    let divergence = classify(&ctx, &branch)?;
    match divergence {
        Divergence::Nop => {
            tracing::debug!(remote = %ctx.remote_name, "Local and remote heads agree");
            Ok(SyncResult::Nop)
        }
        Divergence::PushOnly => {
            if ctx.options.sync_direction == SyncDirection::Pull {
                return Ok(SyncResult::Nop);
            }
            push_worker(ctx, false).await
        }
        Divergence::FastForward { local_oid, remote_oid } => {
            fast_forward(&ctx, &branch, local_oid, remote_oid)
        }
        Divergence::Merge { base_oid, local_oid, remote_oid } => {
            merge_and_push(ctx, base_oid, local_oid, remote_oid).await
        }
    }
}

fn classify(ctx: &WorkerContext, branch: &str) -> Result<Divergence, SyncError> {
    let repo = git::open(&ctx.working_dir)?;
    let head = git::head_commit(&repo)?.ok_or(SyncError::RepositoryNotOpen)?;
    let local_oid = head.id();

    let remote_oid = match git::resolve_tracking(&repo, &ctx.remote_name, branch) {
        // Nothing fetched: the remote branch does not exist yet.
        None => return Ok(Divergence::PushOnly),
        Some(remote_oid) => remote_oid,
    };
    if remote_oid == local_oid {
        return Ok(Divergence::Nop);
    }
    let base_oid = match repo.merge_base(local_oid, remote_oid) {
        Ok(base_oid) => base_oid,
        Err(_) => {
            // A store that never held a document may adopt the remote
            // history outright; that is how a second store "clones" an
            // existing remote.
            let local_commit = repo.find_commit(local_oid)?;
            if local_commit.parent_count() == 0 && local_commit.tree()?.is_empty() {
                return Ok(Divergence::FastForward { local_oid, remote_oid });
            }
            return Err(SyncError::NoMergeBaseFound);
        }
    };

    if base_oid == local_oid {
        Ok(Divergence::FastForward { local_oid, remote_oid })
    } else if base_oid == remote_oid {
        Ok(Divergence::PushOnly)
    } else {
        Ok(Divergence::Merge { base_oid, local_oid, remote_oid })
    }
}

fn fast_forward(
    ctx: &WorkerContext,
    branch: &str,
    local_oid: Oid,
    remote_oid: Oid,
) -> Result<SyncResult, SyncError> {
    let repo = git::open(&ctx.working_dir)?;
    let old_tree = repo.find_commit(local_oid)?.tree()?;
    let new_tree = repo.find_commit(remote_oid)?.tree()?;
    let local_changes = git::get_changed_files(&repo, Some(&old_tree), &new_tree)?;

    git::fast_forward(&repo, branch, remote_oid)?;
    tracing::info!(remote = %ctx.remote_name, to = %remote_oid, "Fast-forwarded");

    let commits = if ctx.options.include_commits {
        Some(CommitSets {
            local: git::get_commit_logs(&repo, remote_oid, Some(local_oid), None)?,
            remote: Vec::new(),
        })
    } else {
        None
    };
    Ok(SyncResult::FastForwardMerge {
        changes: ChangeSets {
            local: local_changes,
            remote: Vec::new(),
        },
        commits,
    })
}

async fn merge_and_push(
    ctx: Arc<WorkerContext>,
    base_oid: Oid,
    local_oid: Oid,
    remote_oid: Oid,
) -> Result<SyncResult, SyncError> {
    // Phase one: read the three trees into plain cells.
    let cells = {
        let repo = git::open(&ctx.working_dir)?;
        let base_tree = repo.find_commit(base_oid)?.tree()?;
        let ours_tree = repo.find_commit(local_oid)?.tree()?;
        let theirs_tree = repo.find_commit(remote_oid)?.tree()?;
        merge::collect_cells(&repo, &base_tree, &ours_tree, &theirs_tree)?
    };

    // Phase two: decide each cell; the user resolver may suspend here.
    let decisions = merge::decide_cells(
        cells,
        &ctx.options.conflict_resolution_strategy,
        &ctx.schema,
    )
    .await?;

    // Phase three: apply, commit the merge, assemble commit lists.
    let (outcome, commits) = {
        let repo = git::open(&ctx.working_dir)?;
        let outcome = merge::apply_decisions(&repo, &ctx.working_dir, decisions)?;

        let message = if outcome.conflicts.is_empty() {
            "merge".to_string()
        } else {
            let mut ids: Vec<&str> = outcome
                .conflicts
                .iter()
                .map(|conflict| conflict.fat_doc.id.as_str())
                .collect();
            ids.sort_unstable();
            format!("resolve: {}", ids.join(", "))
        };

        let tree = repo.find_tree(outcome.tree_oid)?;
        let local_commit = repo.find_commit(local_oid)?;
        let remote_commit = repo.find_commit(remote_oid)?;
        let author = Signature::now(&ctx.author.name, &ctx.author.email)?;
        let committer = Signature::now(&ctx.committer.name, &ctx.committer.email)?;
        let merge_oid = repo.commit(
            Some("HEAD"),
            &author,
            &committer,
            &message,
            &tree,
            &[&local_commit, &remote_commit],
        )?;
        tracing::info!(
            remote = %ctx.remote_name,
            merge = %merge_oid,
            conflicts = outcome.conflicts.len(),
            "Merge committed"
        );

        let commits = if ctx.options.include_commits {
            let merge_commit: NormalizedCommit =
                git::normalize_commit(&repo.find_commit(merge_oid)?);
            let mut local =
                git::get_commit_logs(&repo, remote_oid, Some(base_oid), Some(local_oid))?;
            local.push(merge_commit.clone());
            let mut remote =
                git::get_commit_logs(&repo, local_oid, Some(base_oid), Some(remote_oid))?;
            remote.push(merge_commit);
            Some(CommitSets { local, remote })
        } else {
            None
        };
        (outcome, commits)
    };

    let changes = ChangeSets {
        local: outcome.local_changes,
        remote: outcome.remote_changes,
    };

    // Push the merge commit. The local merge is already committed, so
    // only retryable failures surface as errors; anything else is
    // reported through the error result variants.
    let push_error = if ctx.options.sync_direction == SyncDirection::Pull {
        None
    } else {
        match push_worker(Arc::clone(&ctx), true).await {
            Ok(_) => None,
            Err(SyncError::Remote(err))
                if err.name() == "UnfetchedCommitExists" || err.is_transient() =>
            {
                return Err(SyncError::Remote(err));
            }
            Err(err) => Some(err.to_string()),
        }
    };

    Ok(match (outcome.conflicts.is_empty(), push_error) {
        (true, None) => SyncResult::MergeAndPush { changes, commits },
        (false, None) => SyncResult::ResolveConflictsAndPush {
            conflicts: outcome.conflicts,
            changes,
            commits,
        },
        (true, Some(error)) => SyncResult::MergeAndPushError {
            changes,
            commits,
            error,
        },
        (false, Some(error)) => SyncResult::ResolveConflictsAndPushError {
            conflicts: outcome.conflicts,
            changes,
            commits,
            error,
        },
    })
}
