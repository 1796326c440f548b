//! Runtime settings for the session manager and its negotiations.

use std::time::Duration;

use crate::version::{CompatibilityTable, ProtocolVersion};

/// Everything the session core needs to know about timing and versions.
///
/// Built explicitly by the embedding application; nothing in this crate
/// reads configuration from disk or from global state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on waiting for the start/stop lock.
    pub lock_timeout: Duration,
    /// Bound on waiting for in-flight negotiations to drain on stop.
    pub drain_timeout: Duration,
    /// How long an outgoing invitation waits for the peer to answer.
    pub acceptance_timeout: Duration,
    /// How long any other negotiation step waits for a reply.
    pub response_timeout: Duration,
    /// How often a waiting negotiation re-checks its progress monitor.
    pub monitor_poll_interval: Duration,
    pub version: ProtocolVersion,
    pub compatibility: CompatibilityTable,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let version = ProtocolVersion::new(2, 0, 0);
        Self {
            lock_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(10),
            acceptance_timeout: Duration::from_secs(60),
            response_timeout: Duration::from_secs(30),
            monitor_poll_interval: Duration::from_millis(100),
            version,
            compatibility: CompatibilityTable::new().with_entry(version, vec![version]),
        }
    }
}
