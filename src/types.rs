//! Result and change-set types shared by the workers and the controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::doc::FatDoc;

/// Serializable view of a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCommit {
    pub oid: String,
    pub message: String,
    pub parent: Vec<String>,
    pub author: CommitIdentity,
    pub committer: CommitIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpgsig: Option<String>,
}

/// Author or committer identity on a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

/// A file-level change between two trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum ChangedFile {
    Insert { new: FatDoc },
    Update { old: FatDoc, new: FatDoc },
    Delete { old: FatDoc },
}

impl ChangedFile {
    /// The document as it exists after the change, if any.
    pub fn new_doc(&self) -> Option<&FatDoc> {
        match self {
            ChangedFile::Insert { new } | ChangedFile::Update { new, .. } => Some(new),
            ChangedFile::Delete { .. } => None,
        }
    }

    /// The file path this change applies to.
    pub fn name(&self) -> &str {
        match self {
            ChangedFile::Insert { new } | ChangedFile::Update { new, .. } => &new.name,
            ChangedFile::Delete { old } => &old.name,
        }
    }
}

/// Label naming a conflict resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategyLabel {
    Ours,
    Theirs,
    OursDiff,
    TheirsDiff,
}

impl ConflictStrategyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategyLabel::Ours => "ours",
            ConflictStrategyLabel::Theirs => "theirs",
            ConflictStrategyLabel::OursDiff => "ours-diff",
            ConflictStrategyLabel::TheirsDiff => "theirs-diff",
        }
    }
}

/// Merge-cell operation recorded on an accepted conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictOperation {
    Insert,
    InsertMerge,
    Update,
    UpdateMerge,
    Delete,
}

/// A merge cell where both sides changed and an explicit policy chose the
/// outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedConflict {
    pub fat_doc: FatDoc,
    pub strategy: ConflictStrategyLabel,
    pub operation: ConflictOperation,
}

/// Changed files on each side of a sync cycle.
///
/// `local` changes are applied to the local working tree; `remote` changes
/// become visible on the remote after the push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSets {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local: Vec<ChangedFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote: Vec<ChangedFile>,
}

/// Commit lists included in results when `include_commits` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitSets {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local: Vec<NormalizedCommit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote: Vec<NormalizedCommit>,
}

/// Outcome of a sync or push task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum SyncResult {
    #[serde(rename = "nop")]
    Nop,
    #[serde(rename = "push")]
    Push {
        changes: ChangeSets,
        #[serde(skip_serializing_if = "Option::is_none")]
        commits: Option<CommitSets>,
    },
    #[serde(rename = "fast-forward merge")]
    FastForwardMerge {
        changes: ChangeSets,
        #[serde(skip_serializing_if = "Option::is_none")]
        commits: Option<CommitSets>,
    },
    #[serde(rename = "merge and push")]
    MergeAndPush {
        changes: ChangeSets,
        #[serde(skip_serializing_if = "Option::is_none")]
        commits: Option<CommitSets>,
    },
    #[serde(rename = "merge and push error")]
    MergeAndPushError {
        changes: ChangeSets,
        #[serde(skip_serializing_if = "Option::is_none")]
        commits: Option<CommitSets>,
        error: String,
    },
    #[serde(rename = "resolve conflicts and push")]
    ResolveConflictsAndPush {
        conflicts: Vec<AcceptedConflict>,
        changes: ChangeSets,
        #[serde(skip_serializing_if = "Option::is_none")]
        commits: Option<CommitSets>,
    },
    #[serde(rename = "resolve conflicts and push error")]
    ResolveConflictsAndPushError {
        conflicts: Vec<AcceptedConflict>,
        changes: ChangeSets,
        #[serde(skip_serializing_if = "Option::is_none")]
        commits: Option<CommitSets>,
        error: String,
    },
    #[serde(rename = "combine database")]
    CombineDatabase,
    #[serde(rename = "canceled")]
    Canceled,
}

impl SyncResult {
    /// The action string carried by this variant.
    pub fn action(&self) -> &'static str {
        match self {
            SyncResult::Nop => "nop",
            SyncResult::Push { .. } => "push",
            SyncResult::FastForwardMerge { .. } => "fast-forward merge",
            SyncResult::MergeAndPush { .. } => "merge and push",
            SyncResult::MergeAndPushError { .. } => "merge and push error",
            SyncResult::ResolveConflictsAndPush { .. } => "resolve conflicts and push",
            SyncResult::ResolveConflictsAndPushError { .. } => {
                "resolve conflicts and push error"
            }
            SyncResult::CombineDatabase => "combine database",
            SyncResult::Canceled => "canceled",
        }
    }

    /// Change sets carried by this variant, if any.
    pub fn changes(&self) -> Option<&ChangeSets> {
        match self {
            SyncResult::Push { changes, .. }
            | SyncResult::FastForwardMerge { changes, .. }
            | SyncResult::MergeAndPush { changes, .. }
            | SyncResult::MergeAndPushError { changes, .. }
            | SyncResult::ResolveConflictsAndPush { changes, .. }
            | SyncResult::ResolveConflictsAndPushError { changes, .. } => Some(changes),
            _ => None,
        }
    }
}

/// Kind of task a controller enqueues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLabel {
    Sync,
    Push,
}

/// Metadata attached to every emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_path: Option<String>,
    pub label: TaskLabel,
}
