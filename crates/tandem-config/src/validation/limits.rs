//! Validation for session and negotiation timing limits.

use crate::schema::TandemConfig;

use super::helpers::validate_range;

/// Validate start/stop coordination timeouts.
pub(crate) fn validate_session(errors: &mut Vec<String>, config: &TandemConfig) {
    validate_range(
        errors,
        "session.lock_timeout_ms",
        config.session.lock_timeout_ms,
        100,
        60_000,
    );
    validate_range(
        errors,
        "session.drain_timeout_ms",
        config.session.drain_timeout_ms,
        100,
        60_000,
    );
}

/// Validate per-step negotiation timeouts.
pub(crate) fn validate_negotiation(errors: &mut Vec<String>, config: &TandemConfig) {
    validate_range(
        errors,
        "negotiation.acceptance_timeout_secs",
        config.negotiation.acceptance_timeout_secs,
        1,
        3600,
    );
    validate_range(
        errors,
        "negotiation.response_timeout_secs",
        config.negotiation.response_timeout_secs,
        1,
        3600,
    );
    validate_range(
        errors,
        "negotiation.monitor_poll_ms",
        config.negotiation.monitor_poll_ms,
        10,
        5000,
    );
}
