//! Deterministic remote-name derivation.
//!
//! A registered remote gets a stable Git remote alias derived from its
//! URL: the host with dots replaced by underscores, followed by the first
//! seven hex characters of the SHA-1 of the URL. The same URL always maps
//! to the same name, so tracking refs survive restarts.

use sha1::{Digest, Sha1};

use crate::error::OptionsError;

/// Derive the remote name for a URL.
///
/// Handles `scheme://[user@]host[:port]/path` URLs as well as scp-like
/// `user@host:path` syntax. Remotes without a host (filesystem paths)
/// map to the `local` pseudo-host. Fails on an empty URL.
pub fn encode_to_remote_name(remote_url: &str) -> Result<String, OptionsError> {
    if remote_url.is_empty() {
        return Err(OptionsError::InvalidRepositoryUrl {
            url: remote_url.to_string(),
        });
    }
    let host = extract_host(remote_url).unwrap_or_else(|| "local".to_string());

    let mut hasher = Sha1::new();
    hasher.update(remote_url.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

    Ok(format!("{}_{}", host.replace('.', "_"), &hex[..7]))
}

/// Extract the host part of a Git remote URL.
fn extract_host(remote_url: &str) -> Option<String> {
    // Strip "<scheme>://" if present.
    let rest = match remote_url.find("://") {
        Some(idx) => &remote_url[idx + 3..],
        None => remote_url,
    };

    // Authority ends at the first '/' (or at ':' for scp-like syntax).
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..authority_end];

    // Strip "user@".
    let host_port = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };

    // Strip ":port" or the ":path" of scp-like syntax.
    let host = match host_port.find(':') {
        Some(idx) => &host_port[..idx],
        None => host_port,
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
