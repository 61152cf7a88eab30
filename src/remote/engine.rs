//! Default remote engine over libgit2.
//!
//! Network calls run on the blocking thread pool. libgit2 errors are
//! folded into the fixed [`RemoteError`] taxonomy; the mapping is
//! message-based where libgit2 does not expose a dedicated code.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{
    Cred, Direction, ErrorClass, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks,
    Repository,
};

use crate::error::RemoteError;
use crate::options::{Connection, SyncOptions};

use super::RemoteEngine;

/// Remote engine backed by libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibgitEngine;

impl LibgitEngine {
    pub const ENGINE_ID: &'static str = "libgit2";

    pub fn new() -> Self {
        Self
    }

    fn callbacks(connection: &Connection) -> RemoteCallbacks<'static> {
        let connection = connection.clone();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, _allowed| match &connection {
            Connection::None => Cred::default(),
            Connection::Github {
                personal_access_token,
            } => Cred::userpass_plaintext(
                personal_access_token.as_deref().unwrap_or(""),
                "x-oauth-basic",
            ),
            Connection::Ssh {
                key_path,
                public_key_path,
                pass_phrase,
            } => Cred::ssh_key(
                username_from_url.unwrap_or("git"),
                public_key_path.as_deref().map(Path::new),
                Path::new(key_path),
                pass_phrase.as_deref(),
            ),
        });
        callbacks
    }

    async fn run_blocking<T, F>(f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|err| RemoteError::InvalidGitRemote {
                message: format!("transport task failed: {err}"),
            })?
    }
}

/// Fold a libgit2 error into the remote error taxonomy.
fn map_git2_error(url: &str, err: &git2::Error) -> RemoteError {
    let message = err.message().to_string();
    let lower = message.to_lowercase();

    if err.code() == ErrorCode::NotFastForward
        || lower.contains("fast-forward")
        || lower.contains("fastforward")
    {
        return RemoteError::UnfetchedCommitExists;
    }
    if lower.contains("401") || lower.contains("authentication") || lower.contains("authorization")
    {
        return RemoteError::HttpError401AuthorizationRequired {
            url: url.to_string(),
        };
    }
    if lower.contains("403") {
        return RemoteError::HttpError403Forbidden {
            url: url.to_string(),
        };
    }
    if lower.contains("404") || lower.contains("repository not found") {
        return RemoteError::HttpError404NotFound {
            url: url.to_string(),
        };
    }
    if lower.contains("unsupported url protocol") || lower.contains("invalid url") {
        return RemoteError::InvalidUrlFormat {
            url: url.to_string(),
        };
    }
    match err.class() {
        ErrorClass::Net => {
            if lower.contains("resolve") || lower.contains("connect") {
                RemoteError::CannotConnect {
                    url: url.to_string(),
                    message,
                }
            } else {
                RemoteError::Network { message }
            }
        }
        ErrorClass::Http => RemoteError::Network { message },
        ErrorClass::Ssh => RemoteError::InvalidSshKeyPath { path: message },
        _ => RemoteError::InvalidGitRemote { message },
    }
}

fn open_repo(working_dir: &Path, url: &str) -> Result<Repository, RemoteError> {
    Repository::open(working_dir).map_err(|err| map_git2_error(url, &err))
}

#[async_trait]
impl RemoteEngine for LibgitEngine {
    fn engine_id(&self) -> &'static str {
        Self::ENGINE_ID
    }

    async fn check_fetch(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
    ) -> Result<bool, RemoteError> {
        let working_dir: PathBuf = working_dir.to_path_buf();
        let url = options.remote_url.clone();
        let connection = options.connection.clone();
        let remote_name = remote_name.to_string();

        Self::run_blocking(move || {
            let repo = open_repo(&working_dir, &url)?;
            let mut remote = repo
                .find_remote(&remote_name)
                .map_err(|err| map_git2_error(&url, &err))?;
            let callbacks = Self::callbacks(&connection);
            match remote.connect_auth(Direction::Fetch, Some(callbacks), None) {
                Ok(conn) => {
                    // Listing refs proves the repository answers; an empty
                    // list is still a reachable repository.
                    conn.list().map_err(|err| map_git2_error(&url, &err))?;
                    Ok(true)
                }
                Err(err) => match map_git2_error(&url, &err) {
                    RemoteError::HttpError404NotFound { .. } => Ok(false),
                    other => Err(other),
                },
            }
        })
        .await
    }

    async fn fetch(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
        _local_branch: &str,
        remote_branch: &str,
    ) -> Result<(), RemoteError> {
        let working_dir: PathBuf = working_dir.to_path_buf();
        let url = options.remote_url.clone();
        let connection = options.connection.clone();
        let remote_name = remote_name.to_string();
        let remote_branch = remote_branch.to_string();

        Self::run_blocking(move || {
            let repo = open_repo(&working_dir, &url)?;
            let mut remote = repo
                .find_remote(&remote_name)
                .map_err(|err| map_git2_error(&url, &err))?;
            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(Self::callbacks(&connection));
            // The glob refspec also succeeds against a remote whose
            // branch does not exist yet (first push still pending).
            let refspec = format!("+refs/heads/*:refs/remotes/{remote_name}/*");
            remote
                .fetch(&[refspec.as_str()], Some(&mut fetch_options), None)
                .map_err(|err| map_git2_error(&url, &err))?;
            tracing::debug!(remote = %remote_name, branch = %remote_branch, "Fetch complete");
            Ok(())
        })
        .await
    }

    async fn push(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
        local_branch: &str,
        remote_branch: &str,
    ) -> Result<(), RemoteError> {
        let working_dir: PathBuf = working_dir.to_path_buf();
        let url = options.remote_url.clone();
        let connection = options.connection.clone();
        let remote_name = remote_name.to_string();
        let local_branch = local_branch.to_string();
        let remote_branch = remote_branch.to_string();

        Self::run_blocking(move || {
            let repo = open_repo(&working_dir, &url)?;
            let mut remote = repo
                .find_remote(&remote_name)
                .map_err(|err| map_git2_error(&url, &err))?;

            // Per-ref rejection reasons arrive through the status
            // callback, not the push result.
            let rejection: std::sync::Arc<std::sync::Mutex<Option<String>>> =
                std::sync::Arc::new(std::sync::Mutex::new(None));
            let rejection_cb = std::sync::Arc::clone(&rejection);
            let mut callbacks = Self::callbacks(&connection);
            callbacks.push_update_reference(move |_refname, status| {
                if let Some(status) = status {
                    *rejection_cb.lock().unwrap() = Some(status.to_string());
                }
                Ok(())
            });

            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);
            let refspec = format!("refs/heads/{local_branch}:refs/heads/{remote_branch}");
            remote
                .push(&[refspec.as_str()], Some(&mut push_options))
                .map_err(|err| map_git2_error(&url, &err))?;

            let rejection = rejection.lock().unwrap().take();
            if let Some(status) = rejection {
                let lower = status.to_lowercase();
                if lower.contains("fast-forward")
                    || lower.contains("fastforward")
                    || lower.contains("fetch first")
                {
                    return Err(RemoteError::UnfetchedCommitExists);
                }
                return Err(RemoteError::InvalidGitRemote { message: status });
            }
            tracing::debug!(remote = %remote_name, branch = %remote_branch, "Push complete");
            Ok(())
        })
        .await
    }

    async fn clone_repo(
        &self,
        working_dir: &Path,
        options: &SyncOptions,
        remote_name: &str,
    ) -> Result<(), RemoteError> {
        let working_dir: PathBuf = working_dir.to_path_buf();
        let url = options.remote_url.clone();
        let connection = options.connection.clone();
        let remote_name = remote_name.to_string();

        Self::run_blocking(move || {
            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(Self::callbacks(&connection));
            let mut builder = git2::build::RepoBuilder::new();
            builder.fetch_options(fetch_options);
            builder
                .remote_create(move |repo, _name, url| repo.remote(&remote_name, url))
                .clone(&url, &working_dir)
                .map(|_| ())
                .map_err(|err| map_git2_error(&url, &err))
        })
        .await
    }
}
