//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    let config = TandemConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_lock_timeout_too_small() {
    let mut config = TandemConfig::default();
    config.session.lock_timeout_ms = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("session.lock_timeout_ms"));
}

#[test]
fn catches_drain_timeout_too_large() {
    let mut config = TandemConfig::default();
    config.session.drain_timeout_ms = 600_000;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("session.drain_timeout_ms"));
}

#[test]
fn catches_zero_acceptance_timeout() {
    let mut config = TandemConfig::default();
    config.negotiation.acceptance_timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("negotiation.acceptance_timeout_secs"));
}

#[test]
fn catches_monitor_poll_out_of_range() {
    let mut config = TandemConfig::default();
    config.negotiation.monitor_poll_ms = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("negotiation.monitor_poll_ms"));
}

#[test]
fn catches_malformed_version() {
    let mut config = TandemConfig::default();
    config.protocol.version = "two".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("protocol.version"));
}

#[test]
fn catches_missing_compatibility_entry() {
    let mut config = TandemConfig::default();
    config.protocol.version = "3.0".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("no entry for local version \"3.0\""));
}

#[test]
fn catches_malformed_remote_version() {
    let mut config = TandemConfig::default();
    config
        .protocol
        .compatibility
        .insert("2.0".into(), vec!["2.0".into(), "2.x".into()]);
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("\"2.x\""));
}

#[test]
fn collects_multiple_errors() {
    let mut config = TandemConfig::default();
    config.session.lock_timeout_ms = 0;
    config.negotiation.response_timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("session.lock_timeout_ms"));
    assert!(err.contains("negotiation.response_timeout_secs"));
    assert!(err.contains("; "));
}
