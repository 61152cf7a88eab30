//! Shared context handed to worker tasks.

use std::path::PathBuf;
use std::sync::Arc;

use crate::jsondiff::DiffOptions;
use crate::options::SyncOptions;
use crate::remote::RemoteEngine;

/// Commit identity configured on the store.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Everything a queued worker task needs. Detached from the controller so
/// task futures are `Send + 'static`.
pub struct WorkerContext {
    pub working_dir: PathBuf,
    pub remote_name: String,
    pub options: SyncOptions,
    pub engine: Arc<dyn RemoteEngine>,
    pub author: Identity,
    pub committer: Identity,
    /// Document schema options steering JSON conflict merges.
    pub schema: DiffOptions,
}
