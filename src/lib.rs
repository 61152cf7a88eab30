//! docsync - keep a Git-backed document store in two-way agreement with
//! one or more remote repositories.
//!
//! Documents live as files in a Git working tree; synchronization is
//! ordinary fetch/merge/push layered with a deterministic three-way merge
//! engine, a retry state machine and a serialized task queue.

pub mod doc;
pub mod error;
pub mod git;
pub mod jsondiff;
pub mod options;
pub mod remote;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
mod doc_test;
#[cfg(test)]
mod options_test;

pub use doc::{Doc, DocType, FatDoc, canonicalize};
pub use error::{OptionsError, RemoteError, SyncError};
pub use options::{
    CombineDbStrategy, Connection, ConflictResolutionStrategy, SyncDirection, SyncOptions,
};
pub use store::DocStore;
pub use sync::{Syncer, SyncerState};
pub use types::{
    AcceptedConflict, ChangedFile, ConflictOperation, ConflictStrategyLabel, SyncResult,
};

/// Install ring as the default crypto provider for rustls.
/// This must be called before any reqwest client is created.
pub fn init() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
