//! HTTP reachability probe.
//!
//! Before retrying after a network failure, the controller issues a plain
//! GET against the remote URL. Any response that carries a status code
//! counts as reachable, including 4xx and 5xx; only transport-level
//! failures (DNS, refused connection, timeout) count as unreachable.

use std::time::Duration;

use crate::error::OptionsError;
use crate::options::{DEFAULT_REQUEST_TIMEOUT, is_http_url};

/// Probe timeouts in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTimeouts {
    pub request: u64,
    pub socket: u64,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        ProbeTimeouts {
            request: DEFAULT_REQUEST_TIMEOUT,
            socket: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Validate that a URL is probeable over HTTP.
pub fn validate_probe_url(url: &str) -> Result<(), OptionsError> {
    if is_http_url(url) {
        Ok(())
    } else {
        Err(OptionsError::HttpProtocolRequired {
            url: url.to_string(),
        })
    }
}

/// Check whether the remote URL is reachable.
///
/// Non-HTTP URLs (local paths, ssh remotes) cannot be probed and are
/// treated as reachable so the retry loop proceeds to the transport.
pub async fn is_reachable(url: &str, timeouts: ProbeTimeouts) -> bool {
    if !is_http_url(url) {
        return true;
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(timeouts.request))
        .connect_timeout(Duration::from_millis(timeouts.socket))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to build probe client");
            return false;
        }
    };

    match client.get(url).send().await {
        Ok(response) => {
            tracing::debug!(url = %url, status = %response.status(), "Probe reached remote");
            true
        }
        Err(err) => {
            tracing::warn!(url = %url, error = %err, "Probe could not reach remote");
            false
        }
    }
}
