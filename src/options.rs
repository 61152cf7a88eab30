//! Sync options and validation.
//!
//! Options are validated once, when a syncer is constructed. Invariants:
//! `interval >= MINIMUM_SYNC_INTERVAL`, `interval > retry_interval`, and
//! connection-specific URL/credential preconditions.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::doc::FatDoc;
use crate::error::OptionsError;
use crate::types::ConflictStrategyLabel;

/// Smallest accepted live sync interval in milliseconds.
pub const MINIMUM_SYNC_INTERVAL: u64 = 3_000;

/// Default live sync interval in milliseconds.
pub const DEFAULT_SYNC_INTERVAL: u64 = 30_000;

/// Default spacing between retries after a network error, in milliseconds.
pub const NETWORK_RETRY_INTERVAL: u64 = 5_000;

/// Default maximum retry count.
pub const DEFAULT_RETRY: u32 = 3;

/// Default request timeout for the HTTP reachability probe, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 10_000;

/// Which half of the sync cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Pull,
    Push,
    Both,
}

/// Action taken when local and remote histories share no merge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombineDbStrategy {
    ThrowError,
    CombineHeadWithTheirs,
    /// Reserved. Accepted as an option value, but the no-merge-base path
    /// still surfaces an error.
    ReplaceWithOurs,
}

/// Transport credentials for the remote engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Connection {
    /// Anonymous transport (public HTTP remotes or local paths).
    None,
    /// GitHub-style personal access token over HTTPS.
    Github {
        personal_access_token: Option<String>,
    },
    /// SSH key authentication.
    Ssh {
        key_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        public_key_path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pass_phrase: Option<String>,
    },
}

impl Default for Connection {
    fn default() -> Self {
        Connection::None
    }
}

/// Future returned by a user-supplied conflict resolver.
pub type ResolverFuture = Pin<Box<dyn Future<Output = Option<ConflictStrategyLabel>> + Send>>;

/// User-supplied conflict resolution callback.
///
/// Called with the conflicting documents from each side (absent on the
/// side that deleted the file). Returning `None` falls back to the default
/// label.
pub type ConflictResolver =
    dyn Fn(Option<FatDoc>, Option<FatDoc>) -> ResolverFuture + Send + Sync;

/// Per-conflict decision policy: a fixed label or an async callback.
#[derive(Clone)]
pub enum ConflictResolutionStrategy {
    Label(ConflictStrategyLabel),
    Resolver(Arc<ConflictResolver>),
}

impl ConflictResolutionStrategy {
    /// Resolve the label for one conflict, awaiting the callback if any.
    pub async fn resolve(
        &self,
        ours: Option<FatDoc>,
        theirs: Option<FatDoc>,
    ) -> ConflictStrategyLabel {
        match self {
            ConflictResolutionStrategy::Label(label) => *label,
            ConflictResolutionStrategy::Resolver(resolver) => resolver(ours, theirs)
                .await
                .unwrap_or(ConflictStrategyLabel::OursDiff),
        }
    }
}

impl Default for ConflictResolutionStrategy {
    fn default() -> Self {
        ConflictResolutionStrategy::Label(ConflictStrategyLabel::OursDiff)
    }
}

impl fmt::Debug for ConflictResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictResolutionStrategy::Label(label) => {
                f.debug_tuple("Label").field(label).finish()
            }
            ConflictResolutionStrategy::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Options controlling one registered remote.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub remote_url: String,
    /// Run `try_sync` on a repeating timer.
    pub live: bool,
    pub sync_direction: SyncDirection,
    /// Timer period in milliseconds.
    pub interval: u64,
    /// Backoff between retries in milliseconds. Must be strictly smaller
    /// than `interval`.
    pub retry_interval: u64,
    /// Maximum retry count for recoverable failures.
    pub retry: u32,
    pub combine_db_strategy: CombineDbStrategy,
    /// Include commit lists in sync results.
    pub include_commits: bool,
    pub conflict_resolution_strategy: ConflictResolutionStrategy,
    pub connection: Connection,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            remote_url: String::new(),
            live: false,
            sync_direction: SyncDirection::Both,
            interval: DEFAULT_SYNC_INTERVAL,
            retry_interval: NETWORK_RETRY_INTERVAL,
            retry: DEFAULT_RETRY,
            combine_db_strategy: CombineDbStrategy::CombineHeadWithTheirs,
            include_commits: false,
            conflict_resolution_strategy: ConflictResolutionStrategy::default(),
            connection: Connection::None,
        }
    }
}

impl SyncOptions {
    /// Options for a remote URL with every other field at its default.
    pub fn new(remote_url: impl Into<String>) -> Self {
        SyncOptions {
            remote_url: remote_url.into(),
            ..SyncOptions::default()
        }
    }

    /// Validate the option invariants.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.remote_url.is_empty() {
            return Err(OptionsError::UndefinedRemoteUrl);
        }
        if self.interval < MINIMUM_SYNC_INTERVAL {
            return Err(OptionsError::IntervalTooSmall {
                interval: self.interval,
                minimum: MINIMUM_SYNC_INTERVAL,
            });
        }
        if self.interval <= self.retry_interval {
            return Err(OptionsError::SyncIntervalLessThanOrEqualToRetryInterval {
                interval: self.interval,
                retry_interval: self.retry_interval,
            });
        }
        match &self.connection {
            Connection::Github {
                personal_access_token,
            } => {
                if !is_http_url(&self.remote_url) {
                    return Err(OptionsError::HttpProtocolRequired {
                        url: self.remote_url.clone(),
                    });
                }
                if personal_access_token.as_deref().unwrap_or("").is_empty() {
                    return Err(OptionsError::UndefinedPersonalAccessToken);
                }
            }
            Connection::Ssh { key_path, .. } => {
                if key_path.is_empty() {
                    return Err(OptionsError::InvalidAuthenticationType {
                        auth_type: "ssh without key path".to_string(),
                    });
                }
            }
            Connection::None => {}
        }
        Ok(())
    }
}

/// True when the URL uses the `http:` or `https:` scheme.
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
