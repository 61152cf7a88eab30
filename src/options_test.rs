use crate::error::OptionsError;
use crate::options::{
    Connection, MINIMUM_SYNC_INTERVAL, NETWORK_RETRY_INTERVAL, SyncOptions,
};

#[test]
fn test_defaults_are_valid() {
    let options = SyncOptions::new("https://github.com/foo/bar.git");
    assert!(options.validate().is_ok());
    assert!(!options.live);
    assert_eq!(options.retry, 3);
    assert_eq!(options.retry_interval, NETWORK_RETRY_INTERVAL);
}

#[test]
fn test_missing_url_is_rejected() {
    let options = SyncOptions::default();
    assert!(matches!(
        options.validate(),
        Err(OptionsError::UndefinedRemoteUrl)
    ));
}

#[test]
fn test_interval_below_minimum_is_rejected() {
    let options = SyncOptions {
        interval: MINIMUM_SYNC_INTERVAL - 1,
        retry_interval: 100,
        ..SyncOptions::new("https://github.com/foo/bar.git")
    };
    assert!(matches!(
        options.validate(),
        Err(OptionsError::IntervalTooSmall { .. })
    ));
}

#[test]
fn test_interval_must_exceed_retry_interval() {
    let options = SyncOptions {
        interval: 5_000,
        retry_interval: 5_000,
        ..SyncOptions::new("https://github.com/foo/bar.git")
    };
    assert!(matches!(
        options.validate(),
        Err(OptionsError::SyncIntervalLessThanOrEqualToRetryInterval { .. })
    ));
}

#[test]
fn test_github_connection_requires_http_url() {
    let options = SyncOptions {
        connection: Connection::Github {
            personal_access_token: Some("token".to_string()),
        },
        ..SyncOptions::new("ssh://git@github.com/foo/bar.git")
    };
    assert!(matches!(
        options.validate(),
        Err(OptionsError::HttpProtocolRequired { .. })
    ));
}

#[test]
fn test_github_connection_requires_token() {
    let options = SyncOptions {
        connection: Connection::Github {
            personal_access_token: None,
        },
        ..SyncOptions::new("https://github.com/foo/bar.git")
    };
    assert!(matches!(
        options.validate(),
        Err(OptionsError::UndefinedPersonalAccessToken)
    ));
}

#[test]
fn test_local_path_remote_is_accepted_without_auth() {
    // Anonymous connections may target local bare repositories.
    let options = SyncOptions::new("/tmp/remote.git");
    assert!(options.validate().is_ok());
}
