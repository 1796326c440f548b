//! Conversion from the on-disk config to the runtime settings.

use std::time::Duration;

use tandem_common::TandemError;
use tandem_config::TandemConfig;
use tandem_session::{CompatibilityTable, ProtocolVersion, SessionConfig};

/// Build the [`SessionConfig`] the session manager runs with.
pub fn session_config(config: &TandemConfig) -> Result<SessionConfig, TandemError> {
    let version: ProtocolVersion = config.protocol.version.parse()?;
    let compatibility = CompatibilityTable::from_strings(&config.protocol.compatibility)?;

    Ok(SessionConfig {
        lock_timeout: Duration::from_millis(config.session.lock_timeout_ms),
        drain_timeout: Duration::from_millis(config.session.drain_timeout_ms),
        acceptance_timeout: Duration::from_secs(config.negotiation.acceptance_timeout_secs),
        response_timeout: Duration::from_secs(config.negotiation.response_timeout_secs),
        monitor_poll_interval: Duration::from_millis(config.negotiation.monitor_poll_ms),
        version,
        compatibility,
    })
}
