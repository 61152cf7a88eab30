//! Three-way merge of base, ours and theirs trees.
//!
//! The merge runs in three phases so the user-supplied conflict resolver
//! can be awaited without holding object-store handles across suspension
//! points: collect per-path cells from the trees, decide every cell
//! against the decision table, then apply the decisions to the index and
//! working tree and write the merged tree.

use std::collections::BTreeSet;
use std::path::Path;

use git2::{Oid, Repository, Tree};
use sha1::{Digest, Sha1};

use crate::doc::{Doc, DocType, FatDoc, JSON_EXT, canonicalize};
use crate::error::SyncError;
use crate::git;
use crate::jsondiff::{self, DiffOptions};
use crate::options::ConflictResolutionStrategy;
use crate::types::{AcceptedConflict, ChangedFile, ConflictOperation, ConflictStrategyLabel};

/// One side of a merge cell.
#[derive(Debug, Clone)]
pub struct CellEntry {
    pub oid: String,
    pub doc: FatDoc,
    pub content: Vec<u8>,
}

/// Per-path walker state: blob state in base, ours and theirs.
#[derive(Debug, Clone)]
pub struct MergeCell {
    pub path: String,
    pub base: Option<CellEntry>,
    pub ours: Option<CellEntry>,
    pub theirs: Option<CellEntry>,
}

/// What to do to the working tree for one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum FileAction {
    Keep,
    Write { content: Vec<u8> },
    Remove,
}

/// Decided outcome for one cell.
#[derive(Debug, Clone)]
pub struct CellDecision {
    pub path: String,
    pub action: FileAction,
    pub local_change: Option<ChangedFile>,
    pub remote_change: Option<ChangedFile>,
    pub conflict: Option<AcceptedConflict>,
}

/// Result of a completed merge.
#[derive(Debug)]
pub struct MergeOutcome {
    pub tree_oid: Oid,
    pub local_changes: Vec<ChangedFile>,
    pub remote_changes: Vec<ChangedFile>,
    pub conflicts: Vec<AcceptedConflict>,
}

/// Oid a blob with this content will get, computed without the object
/// store.
pub fn blob_oid(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Collect merge cells from the three trees, in path order.
pub fn collect_cells(
    repo: &Repository,
    base_tree: &Tree<'_>,
    ours_tree: &Tree<'_>,
    theirs_tree: &Tree<'_>,
) -> Result<Vec<MergeCell>, SyncError> {
    let base = git::flatten_tree(repo, base_tree)?;
    let ours = git::flatten_tree(repo, ours_tree)?;
    let theirs = git::flatten_tree(repo, theirs_tree)?;

    let mut paths: BTreeSet<&String> = BTreeSet::new();
    paths.extend(base.keys());
    paths.extend(ours.keys());
    paths.extend(theirs.keys());

    let read_entry = |path: &str, oid: Option<&Oid>| -> Result<Option<CellEntry>, SyncError> {
        match oid {
            None => Ok(None),
            Some(oid) => {
                let blob = repo.find_blob(*oid)?;
                let content = blob.content().to_vec();
                let doc = FatDoc::from_blob(path, &oid.to_string(), &content)?;
                Ok(Some(CellEntry {
                    oid: oid.to_string(),
                    doc,
                    content,
                }))
            }
        }
    };

    let mut cells = Vec::with_capacity(paths.len());
    for path in paths {
        cells.push(MergeCell {
            path: path.clone(),
            base: read_entry(path, base.get(path))?,
            ours: read_entry(path, ours.get(path))?,
            theirs: read_entry(path, theirs.get(path))?,
        });
    }
    Ok(cells)
}

/// Decide every cell against the decision table.
///
/// Holds no object-store handles, so the user resolver can be awaited.
pub async fn decide_cells(
    cells: Vec<MergeCell>,
    strategy: &ConflictResolutionStrategy,
    diff_options: &DiffOptions,
) -> Result<Vec<CellDecision>, SyncError> {
    let mut decisions = Vec::with_capacity(cells.len());
    for cell in cells {
        decisions.push(decide_cell(cell, strategy, diff_options).await?);
    }
    Ok(decisions)
}

async fn decide_cell(
    cell: MergeCell,
    strategy: &ConflictResolutionStrategy,
    diff_options: &DiffOptions,
) -> Result<CellDecision, SyncError> {
    let path = cell.path.clone();
    // The conflict arms consume the cell, so the table matches on clones.
    let (base, ours_entry, theirs_entry) =
        (cell.base.clone(), cell.ours.clone(), cell.theirs.clone());
    let same = |a: &Option<CellEntry>, b: &Option<CellEntry>| match (a, b) {
        (Some(a), Some(b)) => a.oid == b.oid,
        (None, None) => true,
        _ => false,
    };

    let nothing = |path: String| CellDecision {
        path,
        action: FileAction::Keep,
        local_change: None,
        remote_change: None,
        conflict: None,
    };

    match (&base, &ours_entry, &theirs_entry) {
        (None, None, None) => Err(SyncError::InvalidConflictState { path }),

        // Inserted on one side only.
        (None, None, Some(theirs)) => Ok(CellDecision {
            path: path.clone(),
            action: FileAction::Write {
                content: theirs.content.clone(),
            },
            local_change: Some(ChangedFile::Insert {
                new: theirs.doc.clone(),
            }),
            remote_change: None,
            conflict: None,
        }),
        (None, Some(ours), None) => Ok(CellDecision {
            path,
            action: FileAction::Keep,
            local_change: None,
            remote_change: Some(ChangedFile::Insert {
                new: ours.doc.clone(),
            }),
            conflict: None,
        }),

        // Inserted identically on both sides.
        (None, Some(ours), Some(theirs)) if ours.oid == theirs.oid => Ok(nothing(path)),

        // Insert conflict.
        (None, Some(_), Some(_)) => {
            resolve_conflict(cell, ConflictKind::Insert, strategy, diff_options).await
        }

        // Deleted on both sides.
        (Some(_), None, None) => Ok(nothing(path)),

        // Ours deleted, theirs untouched: the deletion stands.
        (Some(_), None, Some(theirs)) if same(&base, &theirs_entry) => Ok(CellDecision {
            path,
            action: FileAction::Keep,
            local_change: None,
            remote_change: Some(ChangedFile::Delete {
                old: theirs.doc.clone(),
            }),
            conflict: None,
        }),

        // Ours deleted, theirs updated.
        (Some(_), None, Some(_)) => {
            resolve_conflict(cell, ConflictKind::OursDeleteTheirsUpdate, strategy, diff_options)
                .await
        }

        // Theirs deleted, ours untouched: drop the file locally.
        (Some(_), Some(ours), None) if same(&base, &ours_entry) => Ok(CellDecision {
            path,
            action: FileAction::Remove,
            local_change: Some(ChangedFile::Delete {
                old: ours.doc.clone(),
            }),
            remote_change: None,
            conflict: None,
        }),

        // Ours updated, theirs deleted.
        (Some(_), Some(_), None) => {
            resolve_conflict(cell, ConflictKind::OursUpdateTheirsDelete, strategy, diff_options)
                .await
        }

        // Updated identically, or untouched on both sides.
        (Some(_), Some(ours), Some(theirs)) if ours.oid == theirs.oid => Ok(nothing(path)),

        // Only theirs changed: fast-forward the file.
        (Some(_), Some(ours), Some(theirs)) if same(&base, &ours_entry) => Ok(CellDecision {
            path,
            action: FileAction::Write {
                content: theirs.content.clone(),
            },
            local_change: Some(ChangedFile::Update {
                old: ours.doc.clone(),
                new: theirs.doc.clone(),
            }),
            remote_change: None,
            conflict: None,
        }),

        // Only ours changed: keep it, the remote catches up on push.
        (Some(_), Some(ours), Some(theirs)) if same(&base, &theirs_entry) => {
            Ok(CellDecision {
                path,
                action: FileAction::Keep,
                local_change: None,
                remote_change: Some(ChangedFile::Update {
                    old: theirs.doc.clone(),
                    new: ours.doc.clone(),
                }),
                conflict: None,
            })
        }

        // Both sides changed to different content.
        (Some(_), Some(_), Some(_)) => {
            resolve_conflict(cell, ConflictKind::Update, strategy, diff_options).await
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictKind {
    Insert,
    Update,
    OursDeleteTheirsUpdate,
    OursUpdateTheirsDelete,
}

async fn resolve_conflict(
    cell: MergeCell,
    kind: ConflictKind,
    strategy: &ConflictResolutionStrategy,
    diff_options: &DiffOptions,
) -> Result<CellDecision, SyncError> {
    let ours_doc = cell.ours.as_ref().map(|entry| entry.doc.clone());
    let theirs_doc = cell.theirs.as_ref().map(|entry| entry.doc.clone());
    let label = strategy.resolve(ours_doc.clone(), theirs_doc.clone()).await;
    let path = cell.path.clone();

    tracing::debug!(path = %path, kind = ?kind, strategy = label.as_str(), "Resolving conflict");

    match kind {
        ConflictKind::Insert | ConflictKind::Update => {
            let ours = cell.ours.as_ref().expect("both sides present");
            let theirs = cell.theirs.as_ref().expect("both sides present");
            let operation_plain = if kind == ConflictKind::Insert {
                ConflictOperation::Insert
            } else {
                ConflictOperation::Update
            };
            let operation_merge = if kind == ConflictKind::Insert {
                ConflictOperation::InsertMerge
            } else {
                ConflictOperation::UpdateMerge
            };

            match label {
                ConflictStrategyLabel::Ours => Ok(CellDecision {
                    path,
                    action: FileAction::Keep,
                    local_change: None,
                    remote_change: Some(remote_facing_change(theirs, &ours.doc)),
                    conflict: Some(AcceptedConflict {
                        fat_doc: ours.doc.clone(),
                        strategy: label,
                        operation: operation_plain,
                    }),
                }),
                ConflictStrategyLabel::Theirs => Ok(CellDecision {
                    path,
                    action: FileAction::Write {
                        content: theirs.content.clone(),
                    },
                    local_change: Some(ChangedFile::Update {
                        old: ours.doc.clone(),
                        new: theirs.doc.clone(),
                    }),
                    remote_change: None,
                    conflict: Some(AcceptedConflict {
                        fat_doc: theirs.doc.clone(),
                        strategy: label,
                        operation: operation_plain,
                    }),
                }),
                ConflictStrategyLabel::OursDiff | ConflictStrategyLabel::TheirsDiff => {
                    let prefer_ours = label == ConflictStrategyLabel::OursDiff;
                    match ours.doc.doc_type {
                        DocType::Json => {
                            let merged = merge_json_cell(
                                &cell, prefer_ours, diff_options,
                            )?;
                            let content = canonicalize(&merged).into_bytes();
                            let oid = blob_oid(&content);
                            let merged_doc = FatDoc {
                                id: path
                                    .strip_suffix(JSON_EXT)
                                    .unwrap_or(&path)
                                    .to_string(),
                                name: path.clone(),
                                file_oid: oid.clone(),
                                doc_type: DocType::Json,
                                doc: Doc::Json(merged),
                            };
                            let local_change = (oid != ours.oid).then(|| ChangedFile::Update {
                                old: ours.doc.clone(),
                                new: merged_doc.clone(),
                            });
                            let remote_change =
                                (oid != theirs.oid).then(|| ChangedFile::Update {
                                    old: theirs.doc.clone(),
                                    new: merged_doc.clone(),
                                });
                            Ok(CellDecision {
                                path,
                                action: FileAction::Write { content },
                                local_change,
                                remote_change,
                                conflict: Some(AcceptedConflict {
                                    fat_doc: merged_doc,
                                    strategy: label,
                                    operation: operation_merge,
                                }),
                            })
                        }
                        // Reserved: text documents fall back to picking a
                        // whole side until patch-merge lands.
                        DocType::Text => {
                            if prefer_ours {
                                Ok(CellDecision {
                                    path,
                                    action: FileAction::Keep,
                                    local_change: None,
                                    remote_change: Some(remote_facing_change(
                                        theirs, &ours.doc,
                                    )),
                                    conflict: Some(AcceptedConflict {
                                        fat_doc: ours.doc.clone(),
                                        strategy: label,
                                        operation: operation_plain,
                                    }),
                                })
                            } else {
                                Ok(CellDecision {
                                    path,
                                    action: FileAction::Write {
                                        content: theirs.content.clone(),
                                    },
                                    local_change: Some(ChangedFile::Update {
                                        old: ours.doc.clone(),
                                        new: theirs.doc.clone(),
                                    }),
                                    remote_change: None,
                                    conflict: Some(AcceptedConflict {
                                        fat_doc: theirs.doc.clone(),
                                        strategy: label,
                                        operation: operation_plain,
                                    }),
                                })
                            }
                        }
                        DocType::Binary => Err(SyncError::InvalidConflictResolutionStrategy {
                            strategy: label.as_str().to_string(),
                            name: path,
                        }),
                    }
                }
            }
        }

        ConflictKind::OursDeleteTheirsUpdate => {
            let theirs = cell.theirs.as_ref().expect("theirs present");
            // A deletion cannot merge with an update; *-diff labels fall
            // back to the matching whole side.
            let pick_ours = matches!(
                label,
                ConflictStrategyLabel::Ours | ConflictStrategyLabel::OursDiff
            );
            if pick_ours {
                Ok(CellDecision {
                    path,
                    action: FileAction::Keep,
                    local_change: None,
                    remote_change: Some(ChangedFile::Delete {
                        old: theirs.doc.clone(),
                    }),
                    conflict: Some(AcceptedConflict {
                        fat_doc: theirs.doc.clone(),
                        strategy: label,
                        operation: ConflictOperation::Delete,
                    }),
                })
            } else {
                Ok(CellDecision {
                    path,
                    action: FileAction::Write {
                        content: theirs.content.clone(),
                    },
                    local_change: Some(ChangedFile::Insert {
                        new: theirs.doc.clone(),
                    }),
                    remote_change: None,
                    conflict: Some(AcceptedConflict {
                        fat_doc: theirs.doc.clone(),
                        strategy: label,
                        operation: ConflictOperation::Update,
                    }),
                })
            }
        }

        ConflictKind::OursUpdateTheirsDelete => {
            let ours = cell.ours.as_ref().expect("ours present");
            let pick_ours = matches!(
                label,
                ConflictStrategyLabel::Ours | ConflictStrategyLabel::OursDiff
            );
            if pick_ours {
                Ok(CellDecision {
                    path,
                    action: FileAction::Keep,
                    local_change: None,
                    remote_change: Some(ChangedFile::Insert {
                        new: ours.doc.clone(),
                    }),
                    conflict: Some(AcceptedConflict {
                        fat_doc: ours.doc.clone(),
                        strategy: label,
                        operation: ConflictOperation::Update,
                    }),
                })
            } else {
                Ok(CellDecision {
                    path,
                    action: FileAction::Remove,
                    local_change: Some(ChangedFile::Delete {
                        old: ours.doc.clone(),
                    }),
                    remote_change: None,
                    conflict: Some(AcceptedConflict {
                        fat_doc: ours.doc.clone(),
                        strategy: label,
                        operation: ConflictOperation::Delete,
                    }),
                })
            }
        }
    }
}

/// The change the remote will observe when ours wins an insert or update
/// conflict: the remote currently holds theirs.
fn remote_facing_change(theirs: &CellEntry, ours_doc: &FatDoc) -> ChangedFile {
    ChangedFile::Update {
        old: theirs.doc.clone(),
        new: ours_doc.clone(),
    }
}

/// Merge the JSON payloads of a conflict cell.
fn merge_json_cell(
    cell: &MergeCell,
    prefer_ours: bool,
    diff_options: &DiffOptions,
) -> Result<serde_json::Value, SyncError> {
    let json_of = |entry: &CellEntry| match &entry.doc.doc {
        Doc::Json(value) => Ok(value.clone()),
        _ => Err(SyncError::InvalidDocType {
            name: entry.doc.name.clone(),
        }),
    };
    let base = cell.base.as_ref().map(|entry| json_of(entry)).transpose()?;
    let ours = json_of(cell.ours.as_ref().expect("ours present"))?;
    let theirs = json_of(cell.theirs.as_ref().expect("theirs present"))?;
    Ok(jsondiff::merge_docs(
        base.as_ref(),
        &ours,
        &theirs,
        prefer_ours,
        diff_options,
    ))
}

/// Apply decided cells to the working tree and index, then write the
/// merged tree.
pub fn apply_decisions(
    repo: &Repository,
    working_dir: &Path,
    decisions: Vec<CellDecision>,
) -> Result<MergeOutcome, SyncError> {
    let mut local_changes = Vec::new();
    let mut remote_changes = Vec::new();
    let mut conflicts = Vec::new();

    for decision in decisions {
        match decision.action {
            FileAction::Keep => {}
            FileAction::Write { content } => {
                git::write_working_file(working_dir, &decision.path, &content)?;
                git::add_to_index(repo, &decision.path)?;
            }
            FileAction::Remove => {
                git::remove_working_file(working_dir, &decision.path)?;
                git::remove_from_index(repo, &decision.path)?;
            }
        }
        local_changes.extend(decision.local_change);
        remote_changes.extend(decision.remote_change);
        conflicts.extend(decision.conflict);
    }

    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    Ok(MergeOutcome {
        tree_oid,
        local_changes,
        remote_changes,
        conflicts,
    })
}
