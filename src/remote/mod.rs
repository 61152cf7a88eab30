//! Remote engine plug point.
//!
//! The transport (fetch / push / clone / reachability probe) is pluggable:
//! the workers talk to a [`RemoteEngine`] trait object and classify its
//! failures through the fixed [`RemoteError`] taxonomy by name string, so
//! engines loaded across crate boundaries interoperate.
//!
//! [`RemoteError`]: crate::error::RemoteError

mod engine;
mod name;
mod probe;

#[cfg(test)]
mod name_test;

use std::path::Path;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::RemoteError;
use crate::options::SyncOptions;

pub use engine::LibgitEngine;
pub use name::encode_to_remote_name;
pub use probe::{ProbeTimeouts, is_reachable, validate_probe_url};

/// Transport backend for one remote.
///
/// All operations act on the repository at `working_dir` and the Git
/// remote registered under `remote_name`. Implementations return errors
/// from the fixed [`RemoteError`] taxonomy only.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteEngine: Send + Sync {
    /// Identifier of this engine implementation.
    fn engine_id(&self) -> &'static str;

    /// Probe the remote with a fetch-direction connection.
    ///
    /// Returns `Ok(false)` when the remote answers but the repository does
    /// not exist (creation is delegated to the caller).
    async fn check_fetch(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
    ) -> Result<bool, RemoteError>;

    /// Fetch `remote_branch` into `refs/remotes/<remote_name>/<remote_branch>`.
    async fn fetch(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
        local_branch: &str,
        remote_branch: &str,
    ) -> Result<(), RemoteError>;

    /// Push `local_branch` to the remote `remote_branch`.
    async fn push(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
        local_branch: &str,
        remote_branch: &str,
    ) -> Result<(), RemoteError>;

    /// Clone the remote repository into `working_dir`.
    async fn clone_repo(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
    ) -> Result<(), RemoteError>;
}
