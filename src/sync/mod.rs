//! Synchronization engine.
//!
//! The controller owns lifecycle, retries, the live timer and event
//! dispatch; the push and sync workers run the Git cycles inside
//! serialized queue tasks; the merge module implements the per-path
//! three-way decision table.

mod context;
mod controller;
mod events;
mod merge;
mod push_worker;
mod queue;
mod sync_worker;

#[cfg(test)]
mod queue_test;
#[cfg(test)]
mod worker_test;

pub use context::{Identity, WorkerContext};
pub use controller::{ResumeOptions, Syncer, SyncerState};
pub use events::{
    EventRegistry, HandlerId, SyncEvent, SyncEventHandler, SyncEventKind,
    normalize_collection_path,
};
pub use merge::{MergeOutcome, blob_oid};
pub use queue::{TaskHandle, TaskQueue};
