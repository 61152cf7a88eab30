//! Error types for the synchronization engine.
//!
//! Three layers: option errors raised while constructing a [`Syncer`],
//! remote errors raised by a [`RemoteEngine`] implementation, and
//! operational errors raised by the push/sync workers. Remote engines may
//! be plugged in across crate boundaries, so remote errors are
//! re-classified by their stable [`RemoteError::name`] string rather than
//! by type identity.
//!
//! [`Syncer`]: crate::sync::Syncer
//! [`RemoteEngine`]: crate::remote::RemoteEngine

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while validating sync options or constructing a syncer.
#[derive(Error, Diagnostic, Debug)]
pub enum OptionsError {
    #[error("Remote URL is not defined")]
    #[diagnostic(code(docsync::options::undefined_remote_url))]
    UndefinedRemoteUrl,

    #[error("Sync interval {interval}ms is less than the minimum {minimum}ms")]
    #[diagnostic(code(docsync::options::interval_too_small))]
    IntervalTooSmall { interval: u64, minimum: u64 },

    #[error("Sync interval {interval}ms must be greater than retry interval {retry_interval}ms")]
    #[diagnostic(code(docsync::options::interval_not_greater_than_retry))]
    SyncIntervalLessThanOrEqualToRetryInterval { interval: u64, retry_interval: u64 },

    #[error("URL '{url}' must use the http or https protocol")]
    #[diagnostic(code(docsync::options::http_protocol_required))]
    HttpProtocolRequired { url: String },

    #[error("Invalid authentication type: {auth_type}")]
    #[diagnostic(code(docsync::options::invalid_authentication_type))]
    InvalidAuthenticationType { auth_type: String },

    #[error("Personal access token is not defined")]
    #[diagnostic(code(docsync::options::undefined_personal_access_token))]
    UndefinedPersonalAccessToken,

    #[error("Invalid repository URL: {url}")]
    #[diagnostic(code(docsync::options::invalid_repository_url))]
    InvalidRepositoryUrl { url: String },
}

/// Errors returned by a remote engine.
///
/// The set of variants is a fixed taxonomy shared by every engine
/// implementation. [`RemoteError::name`] returns the stable identifier the
/// controller uses for classification.
#[derive(Error, Diagnostic, Debug)]
pub enum RemoteError {
    #[error("Cannot connect to '{url}': {message}")]
    #[diagnostic(code(docsync::remote::cannot_connect))]
    CannotConnect { url: String, message: String },

    #[error("HTTP 401 authorization required: {url}")]
    #[diagnostic(code(docsync::remote::http_401))]
    HttpError401AuthorizationRequired { url: String },

    #[error("HTTP 403 forbidden: {url}")]
    #[diagnostic(code(docsync::remote::http_403))]
    HttpError403Forbidden { url: String },

    #[error("HTTP 404 not found: {url}")]
    #[diagnostic(code(docsync::remote::http_404))]
    HttpError404NotFound { url: String },

    #[error("Invalid authentication type: {auth_type}")]
    #[diagnostic(code(docsync::remote::invalid_authentication_type))]
    InvalidAuthenticationType { auth_type: String },

    #[error("Invalid git remote: {message}")]
    #[diagnostic(code(docsync::remote::invalid_git_remote))]
    InvalidGitRemote { message: String },

    #[error("Invalid repository URL: {url}")]
    #[diagnostic(code(docsync::remote::invalid_repository_url))]
    InvalidRepositoryUrl { url: String },

    #[error("Invalid SSH key path: {path}")]
    #[diagnostic(code(docsync::remote::invalid_ssh_key_path))]
    InvalidSshKeyPath { path: String },

    #[error("Invalid URL format: {url}")]
    #[diagnostic(code(docsync::remote::invalid_url_format))]
    InvalidUrlFormat { url: String },

    #[error("Network error: {message}")]
    #[diagnostic(code(docsync::remote::network))]
    Network { message: String },

    #[error("Push rejected: remote contains unfetched commits")]
    #[diagnostic(code(docsync::remote::unfetched_commit_exists))]
    UnfetchedCommitExists,
}

impl RemoteError {
    /// Stable name used for classification across engine plug-in
    /// boundaries. The controller matches on this string, never on the
    /// concrete type.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteError::CannotConnect { .. } => "CannotConnect",
            RemoteError::HttpError401AuthorizationRequired { .. } => "HTTPError401",
            RemoteError::HttpError403Forbidden { .. } => "HTTPError403",
            RemoteError::HttpError404NotFound { .. } => "HTTPError404",
            RemoteError::InvalidAuthenticationType { .. } => "InvalidAuthenticationType",
            RemoteError::InvalidGitRemote { .. } => "InvalidGitRemote",
            RemoteError::InvalidRepositoryUrl { .. } => "InvalidRepositoryURL",
            RemoteError::InvalidSshKeyPath { .. } => "InvalidSSHKeyPath",
            RemoteError::InvalidUrlFormat { .. } => "InvalidURLFormat",
            RemoteError::Network { .. } => "NetworkError",
            RemoteError::UnfetchedCommitExists => "UnfetchedCommitExists",
        }
    }

    /// True when retrying the operation may succeed without operator
    /// intervention (transient transport conditions).
    pub fn is_transient(&self) -> bool {
        matches!(
            self.name(),
            "CannotConnect" | "NetworkError"
        )
    }
}

/// Errors raised by the push and sync workers.
#[derive(Error, Diagnostic, Debug)]
pub enum SyncError {
    #[error("Repository is not open")]
    #[diagnostic(code(docsync::sync::repository_not_open))]
    RepositoryNotOpen,

    #[error("Push is not allowed when sync direction is 'pull'")]
    #[diagnostic(code(docsync::sync::push_not_allowed))]
    PushNotAllowed,

    #[error("No merge base found between local and remote heads")]
    #[diagnostic(code(docsync::sync::no_merge_base_found))]
    NoMergeBaseFound,

    #[error("Databases must be combined")]
    #[diagnostic(code(docsync::sync::combine_database))]
    CombineDatabase,

    #[error("Invalid JSON object in '{name}': {message}")]
    #[diagnostic(code(docsync::sync::invalid_json_object))]
    InvalidJsonObject { name: String, message: String },

    #[error("Invalid document type for '{name}'")]
    #[diagnostic(code(docsync::sync::invalid_doc_type))]
    InvalidDocType { name: String },

    #[error("Invalid conflict state at '{path}'")]
    #[diagnostic(code(docsync::sync::invalid_conflict_state))]
    InvalidConflictState { path: String },

    #[error("Conflict resolution strategy '{strategy}' is not applicable to '{name}'")]
    #[diagnostic(code(docsync::sync::invalid_conflict_resolution_strategy))]
    InvalidConflictResolutionStrategy { strategy: String, name: String },

    #[error("Cannot create directory '{path}': {message}")]
    #[diagnostic(code(docsync::sync::cannot_create_directory))]
    CannotCreateDirectory { path: String, message: String },

    #[error("Cannot delete data at '{path}': {message}")]
    #[diagnostic(code(docsync::sync::cannot_delete_data))]
    CannotDeleteData { path: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Remote(#[from] RemoteError),

    #[error("Git error: {message}")]
    #[diagnostic(code(docsync::sync::git))]
    Git { message: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(docsync::sync::io))]
    Io(#[from] std::io::Error),

    #[error("Push worker error: {message}")]
    #[diagnostic(code(docsync::sync::push_worker))]
    PushWorker { message: String },

    #[error("Sync worker error: {message}")]
    #[diagnostic(code(docsync::sync::sync_worker))]
    SyncWorker { message: String },
}

impl From<git2::Error> for SyncError {
    fn from(err: git2::Error) -> Self {
        SyncError::Git {
            message: err.message().to_string(),
        }
    }
}

impl SyncError {
    /// Wrap any worker failure that is not already part of the taxonomy.
    pub fn push_worker(err: impl std::fmt::Display) -> Self {
        SyncError::PushWorker {
            message: err.to_string(),
        }
    }

    /// Wrap any worker failure that is not already part of the taxonomy.
    pub fn sync_worker(err: impl std::fmt::Display) -> Self {
        SyncError::SyncWorker {
            message: err.to_string(),
        }
    }
}
