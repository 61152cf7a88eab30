//! Event subscription and dispatch.
//!
//! Subscribers register per event kind, optionally scoped to a collection
//! path. Scoped handlers only see the changed files under their prefix,
//! with document ids re-rooted relative to it; they are skipped entirely
//! when the filtered change set is empty.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{ChangedFile, SyncResult, TaskMetadata};

/// Kinds of events a syncer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEventKind {
    Start,
    Change,
    LocalChange,
    RemoteChange,
    Combine,
    Paused,
    Active,
    Complete,
    Error,
}

/// An emitted event.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Start {
        task_metadata: TaskMetadata,
    },
    Change {
        result: SyncResult,
        task_metadata: TaskMetadata,
    },
    LocalChange {
        changes: Vec<ChangedFile>,
        task_metadata: TaskMetadata,
    },
    RemoteChange {
        changes: Vec<ChangedFile>,
        task_metadata: TaskMetadata,
    },
    Combine {
        task_metadata: TaskMetadata,
    },
    Paused,
    Active,
    Complete {
        task_metadata: TaskMetadata,
    },
    Error {
        message: String,
        task_metadata: TaskMetadata,
    },
}

impl SyncEvent {
    pub fn kind(&self) -> SyncEventKind {
        match self {
            SyncEvent::Start { .. } => SyncEventKind::Start,
            SyncEvent::Change { .. } => SyncEventKind::Change,
            SyncEvent::LocalChange { .. } => SyncEventKind::LocalChange,
            SyncEvent::RemoteChange { .. } => SyncEventKind::RemoteChange,
            SyncEvent::Combine { .. } => SyncEventKind::Combine,
            SyncEvent::Paused => SyncEventKind::Paused,
            SyncEvent::Active => SyncEventKind::Active,
            SyncEvent::Complete { .. } => SyncEventKind::Complete,
            SyncEvent::Error { .. } => SyncEventKind::Error,
        }
    }

    fn task_metadata_mut(&mut self) -> Option<&mut TaskMetadata> {
        match self {
            SyncEvent::Start { task_metadata }
            | SyncEvent::Change { task_metadata, .. }
            | SyncEvent::LocalChange { task_metadata, .. }
            | SyncEvent::RemoteChange { task_metadata, .. }
            | SyncEvent::Combine { task_metadata }
            | SyncEvent::Complete { task_metadata }
            | SyncEvent::Error { task_metadata, .. } => Some(task_metadata),
            SyncEvent::Paused | SyncEvent::Active => None,
        }
    }
}

/// Callback invoked for matching events.
pub type SyncEventHandler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Token returned by [`EventRegistry::on`]; pass to [`EventRegistry::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

struct HandlerEntry {
    id: u64,
    kind: SyncEventKind,
    collection_path: Option<String>,
    handler: SyncEventHandler,
}

/// Ordered per-kind handler lists.
///
/// Handlers are invoked in registration order. They must not mutate their
/// own subscription list for the event being dispatched.
#[derive(Default)]
pub struct EventRegistry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<HandlerEntry>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, optionally scoped to a collection path.
    pub fn on(
        &self,
        kind: SyncEventKind,
        handler: SyncEventHandler,
        collection_path: Option<String>,
    ) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().unwrap().push(HandlerEntry {
            id,
            kind,
            collection_path: collection_path.map(|p| normalize_collection_path(&p)),
            handler,
        });
        HandlerId(id)
    }

    /// Deregister a handler.
    pub fn off(&self, id: HandlerId) {
        self.handlers.lock().unwrap().retain(|entry| entry.id != id.0);
    }

    /// Drop all handlers.
    pub fn clear(&self) {
        self.handlers.lock().unwrap().clear();
    }

    /// Dispatch an event to every matching handler.
    pub fn emit(&self, event: &SyncEvent) {
        let kind = event.kind();
        // Snapshot under the lock so handlers can register and remove
        // subscriptions for future events without deadlocking.
        let matching: Vec<(Option<String>, SyncEventHandler)> = {
            let handlers = self.handlers.lock().unwrap();
            handlers
                .iter()
                .filter(|entry| entry.kind == kind)
                .map(|entry| (entry.collection_path.clone(), Arc::clone(&entry.handler)))
                .collect()
        };
        for (collection_path, handler) in matching {
            match &collection_path {
                None => handler(event),
                Some(prefix) if prefix.is_empty() => handler(event),
                Some(prefix) => {
                    if let Some(scoped) = scope_event(event, prefix) {
                        handler(&scoped);
                    }
                }
            }
        }
    }
}

/// Normalize a collection path to `a/b/` form.
pub fn normalize_collection_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Narrow an event to one collection prefix.
///
/// Change-carrying events are filtered and re-rooted; `None` means the
/// handler should not fire. Other events pass through with the prefix
/// recorded on their task metadata.
fn scope_event(event: &SyncEvent, prefix: &str) -> Option<SyncEvent> {
    let mut scoped = match event {
        SyncEvent::Change {
            result,
            task_metadata,
        } => {
            let result = scope_result(result, prefix)?;
            SyncEvent::Change {
                result,
                task_metadata: task_metadata.clone(),
            }
        }
        SyncEvent::LocalChange {
            changes,
            task_metadata,
        } => {
            let changes = filter_changes(changes, prefix);
            if changes.is_empty() {
                return None;
            }
            SyncEvent::LocalChange {
                changes,
                task_metadata: task_metadata.clone(),
            }
        }
        SyncEvent::RemoteChange {
            changes,
            task_metadata,
        } => {
            let changes = filter_changes(changes, prefix);
            if changes.is_empty() {
                return None;
            }
            SyncEvent::RemoteChange {
                changes,
                task_metadata: task_metadata.clone(),
            }
        }
        other => other.clone(),
    };
    if let Some(task_metadata) = scoped.task_metadata_mut() {
        task_metadata.collection_path = Some(prefix.to_string());
    }
    Some(scoped)
}

/// Narrow a result's change sets. `None` when nothing under the prefix
/// changed.
fn scope_result(result: &SyncResult, prefix: &str) -> Option<SyncResult> {
    let mut scoped = result.clone();
    let (filtered_local, filtered_remote) = match scoped {
        SyncResult::Push { ref mut changes, .. }
        | SyncResult::FastForwardMerge { ref mut changes, .. }
        | SyncResult::MergeAndPush { ref mut changes, .. }
        | SyncResult::MergeAndPushError { ref mut changes, .. }
        | SyncResult::ResolveConflictsAndPush { ref mut changes, .. }
        | SyncResult::ResolveConflictsAndPushError { ref mut changes, .. } => {
            changes.local = filter_changes(&changes.local, prefix);
            changes.remote = filter_changes(&changes.remote, prefix);
            (changes.local.is_empty(), changes.remote.is_empty())
        }
        _ => return None,
    };
    if filtered_local && filtered_remote {
        None
    } else {
        Some(scoped)
    }
}

/// Keep only changes under `prefix`, re-rooting ids and names.
pub fn filter_changes(changes: &[ChangedFile], prefix: &str) -> Vec<ChangedFile> {
    changes
        .iter()
        .filter(|change| change.name().starts_with(prefix))
        .map(|change| reroot_change(change, prefix))
        .collect()
}

fn reroot_change(change: &ChangedFile, prefix: &str) -> ChangedFile {
    let strip = |doc: &crate::doc::FatDoc| {
        let mut doc = doc.clone();
        doc.name = doc.name[prefix.len()..].to_string();
        if let Some(id) = doc.id.strip_prefix(prefix) {
            doc.id = id.to_string();
        }
        doc
    };
    match change {
        ChangedFile::Insert { new } => ChangedFile::Insert { new: strip(new) },
        ChangedFile::Update { old, new } => ChangedFile::Update {
            old: strip(old),
            new: strip(new),
        },
        ChangedFile::Delete { old } => ChangedFile::Delete { old: strip(old) },
    }
}
